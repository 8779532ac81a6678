use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Kind of media a candidate refers to
///
/// Movie and series candidates travel through parallel, type-specific paths
/// and are never mixed within one pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Series => write!(f, "series"),
        }
    }
}

/// Provenance of a candidate
///
/// Enumeration order doubles as global-source priority: when the same title
/// arrives from several sources, the earliest variant wins the dedup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Discover,
    Trending,
    Popular,
    Recommended,
    Similar,
    UserFeed,
}

impl Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CandidateSource::Discover => "discover",
            CandidateSource::Trending => "trending",
            CandidateSource::Popular => "popular",
            CandidateSource::Recommended => "recommended",
            CandidateSource::Similar => "similar",
            CandidateSource::UserFeed => "user_feed",
        };
        write!(f, "{}", name)
    }
}

/// A cast credit carried by fully-enriched candidates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CastMember {
    pub tmdb_id: i64,
    pub name: String,
    pub character: Option<String>,
    pub profile_path: Option<String>,
}

/// A content item under evaluation for recommendation
///
/// Created by sourcing; optional fields are filled (never overwritten) by
/// enrichment. Immutable once scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawCandidate {
    pub tmdb_id: i64,
    pub media_type: MediaType,
    /// Cross-reference id, filled by full enrichment
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub language: Option<String>,
    pub overview: Option<String>,
    pub release_year: Option<i32>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    pub popularity: Option<f32>,
    pub source: CandidateSource,
    /// The watched/rated item that led to this candidate, for personalized sources
    pub seed_tmdb_id: Option<i64>,
    /// Top-10 cast, filled by full enrichment
    pub cast: Vec<CastMember>,
    /// Deduplicated director (movies) or creator (series) names
    pub directors: Vec<String>,
    pub runtime_minutes: Option<u32>,
    pub tagline: Option<String>,
    /// Set during merge/filter when the dislike policy is `Reduce`
    pub score_penalty: Option<f32>,
}

impl RawCandidate {
    pub fn new(tmdb_id: i64, media_type: MediaType, title: &str, source: CandidateSource) -> Self {
        Self {
            tmdb_id,
            media_type,
            imdb_id: None,
            title: title.to_string(),
            original_title: None,
            language: None,
            overview: None,
            release_year: None,
            poster_path: None,
            backdrop_path: None,
            genres: Vec::new(),
            vote_average: None,
            vote_count: None,
            popularity: None,
            source,
            seed_tmdb_id: None,
            cast: Vec::new(),
            directors: Vec::new(),
            runtime_minutes: None,
            tagline: None,
            score_penalty: None,
        }
    }

    /// Fill-the-gaps merge: take fields from `other` only where this
    /// candidate has none. Existing values are never overwritten.
    pub fn fill_missing_from(&mut self, other: &RawCandidate) {
        if self.imdb_id.is_none() {
            self.imdb_id = other.imdb_id.clone();
        }
        if self.original_title.is_none() {
            self.original_title = other.original_title.clone();
        }
        if self.language.is_none() {
            self.language = other.language.clone();
        }
        if self.overview.is_none() {
            self.overview = other.overview.clone();
        }
        if self.release_year.is_none() {
            self.release_year = other.release_year;
        }
        if self.poster_path.is_none() {
            self.poster_path = other.poster_path.clone();
        }
        if self.backdrop_path.is_none() {
            self.backdrop_path = other.backdrop_path.clone();
        }
        if self.genres.is_empty() {
            self.genres = other.genres.clone();
        }
        if self.vote_average.is_none() {
            self.vote_average = other.vote_average;
        }
        if self.vote_count.is_none() {
            self.vote_count = other.vote_count;
        }
        if self.popularity.is_none() {
            self.popularity = other.popularity;
        }
        if self.cast.is_empty() {
            self.cast = other.cast.clone();
        }
        if self.directors.is_empty() {
            self.directors = other.directors.clone();
        }
        if self.runtime_minutes.is_none() {
            self.runtime_minutes = other.runtime_minutes;
        }
        if self.tagline.is_none() {
            self.tagline = other.tagline.clone();
        }
    }

    /// Whether the basic enrichment tier should touch this candidate
    pub fn needs_basic_enrichment(&self) -> bool {
        self.poster_path.is_none() || self.language.is_none()
    }

    /// Whether the full enrichment tier should touch this candidate
    pub fn needs_full_enrichment(&self) -> bool {
        self.poster_path.is_none()
            || self.imdb_id.is_none()
            || self.cast.is_empty()
            || self.language.is_none()
    }
}

/// A candidate with its four component scores and the weighted composite
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: RawCandidate,
    pub similarity: f32,
    pub novelty: f32,
    pub rating: f32,
    pub diversity: f32,
    pub final_score: f32,
}

/// Output of the selector
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Selected candidates in selection order (rank 1..N)
    pub selected: Vec<ScoredCandidate>,
    /// The complete ranked input, kept for audit and persistence
    pub ranked: Vec<ScoredCandidate>,
    /// Indices into `ranked` of the selected candidates, in selection order
    pub selected_indices: Vec<usize>,
}
