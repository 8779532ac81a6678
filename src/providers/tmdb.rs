/// TMDB catalog provider
///
/// Serves global feeds (trending, popular, paged discover) and seed-driven
/// feeds (recommendations, similar) for both movies and series, plus the
/// per-user watchlist feed when a linked session token is available.
///
/// List endpoints return genre ids only, so the provider loads the genre
/// id → name mappings for both media types once at construction and maps
/// them during conversion.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{CandidateSource, CastMember, MediaType, RawCandidate};
use crate::providers::{CatalogProvider, Credits};

const MAX_CAST: usize = 10;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    /// Genre id → name, loaded once at construction
    genre_names: HashMap<i64, String>,
}

impl TmdbProvider {
    /// Creates a TMDB provider and loads genre mappings
    ///
    /// With no API key the provider is constructed unconfigured: genre
    /// loading is skipped and sourcing will skip its feeds.
    pub async fn connect(api_key: Option<String>, api_url: String) -> DiscoveryResult<Self> {
        let mut provider = Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            genre_names: HashMap::new(),
        };

        if provider.is_configured() {
            provider.genre_names = provider.load_genre_mappings().await?;
            tracing::info!(
                genre_count = provider.genre_names.len(),
                "Loaded TMDB genre mappings"
            );
        }

        Ok(provider)
    }

    /// Loads genre id → name mappings for both media types
    async fn load_genre_mappings(&self) -> DiscoveryResult<HashMap<i64, String>> {
        #[derive(Deserialize)]
        struct GenreList {
            genres: Vec<TmdbGenre>,
        }

        let mut mappings = HashMap::new();
        for media_type in [MediaType::Movie, MediaType::Series] {
            let url = format!("{}/genre/{}/list", self.api_url, media_path(media_type));
            let list: GenreList = self.get_json(&url, &[]).await?;
            for genre in list.genres {
                mappings.insert(genre.id, genre.name);
            }
        }

        Ok(mappings)
    }

    fn api_key(&self) -> DiscoveryResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| DiscoveryError::Provider("TMDB API key not configured".to_string()))
    }

    /// GET a TMDB endpoint with the api key plus extra query params
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> DiscoveryResult<T> {
        let mut query: Vec<(&str, String)> = vec![("api_key", self.api_key()?.to_string())];
        query.extend(params.iter().cloned());

        let response = self.http_client.get(url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Provider(format!(
                "TMDB returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Fetches one list endpoint and converts results, truncated to `limit`
    async fn fetch_list(
        &self,
        url: &str,
        params: &[(&str, String)],
        media_type: MediaType,
        source: CandidateSource,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let page: TmdbPage = self.get_json(url, params).await?;

        Ok(page
            .results
            .into_iter()
            .take(limit)
            .map(|item| self.to_candidate(item, media_type, source))
            .collect())
    }

    fn to_candidate(
        &self,
        item: TmdbListItem,
        media_type: MediaType,
        source: CandidateSource,
    ) -> RawCandidate {
        let genres = item
            .genre_ids
            .iter()
            .filter_map(|id| self.genre_names.get(id).cloned())
            .collect();

        RawCandidate {
            tmdb_id: item.id,
            media_type,
            imdb_id: None,
            title: item.title.unwrap_or_default(),
            original_title: item.original_title,
            language: item.original_language,
            overview: item.overview.filter(|o| !o.is_empty()),
            release_year: item.release_date.as_deref().and_then(parse_year),
            poster_path: item.poster_path,
            backdrop_path: item.backdrop_path,
            genres,
            vote_average: item.vote_average,
            vote_count: item.vote_count,
            popularity: item.popularity,
            source,
            seed_tmdb_id: None,
            cast: Vec::new(),
            directors: Vec::new(),
            runtime_minutes: None,
            tagline: None,
            score_penalty: None,
        }
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn fetch_trending(
        &self,
        media_type: MediaType,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let url = format!("{}/trending/{}/week", self.api_url, media_path(media_type));
        self.fetch_list(&url, &[], media_type, CandidateSource::Trending, limit)
            .await
    }

    async fn fetch_popular(
        &self,
        media_type: MediaType,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let url = format!("{}/{}/popular", self.api_url, media_path(media_type));
        self.fetch_list(&url, &[], media_type, CandidateSource::Popular, limit)
            .await
    }

    async fn fetch_discover(
        &self,
        media_type: MediaType,
        page: u32,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let url = format!("{}/discover/{}", self.api_url, media_path(media_type));
        let params = [
            ("sort_by", "popularity.desc".to_string()),
            ("page", page.to_string()),
        ];
        self.fetch_list(&url, &params, media_type, CandidateSource::Discover, usize::MAX)
            .await
    }

    async fn fetch_recommendations_for(
        &self,
        media_type: MediaType,
        seed_tmdb_id: i64,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let url = format!(
            "{}/{}/{}/recommendations",
            self.api_url,
            media_path(media_type),
            seed_tmdb_id
        );
        let mut candidates = self
            .fetch_list(&url, &[], media_type, CandidateSource::Recommended, limit)
            .await?;
        for candidate in &mut candidates {
            candidate.seed_tmdb_id = Some(seed_tmdb_id);
        }
        Ok(candidates)
    }

    async fn fetch_similar_to(
        &self,
        media_type: MediaType,
        seed_tmdb_id: i64,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        let url = format!(
            "{}/{}/{}/similar",
            self.api_url,
            media_path(media_type),
            seed_tmdb_id
        );
        let mut candidates = self
            .fetch_list(&url, &[], media_type, CandidateSource::Similar, limit)
            .await?;
        for candidate in &mut candidates {
            candidate.seed_tmdb_id = Some(seed_tmdb_id);
        }
        Ok(candidates)
    }

    async fn fetch_details(
        &self,
        media_type: MediaType,
        tmdb_id: i64,
    ) -> DiscoveryResult<RawCandidate> {
        let url = format!("{}/{}/{}", self.api_url, media_path(media_type), tmdb_id);
        let details: TmdbDetails = self
            .get_json(&url, &[("append_to_response", "external_ids".to_string())])
            .await?;

        Ok(details.into_candidate(media_type))
    }

    async fn fetch_credits(
        &self,
        media_type: MediaType,
        tmdb_id: i64,
    ) -> DiscoveryResult<Credits> {
        let url = format!(
            "{}/{}/{}/credits",
            self.api_url,
            media_path(media_type),
            tmdb_id
        );
        let credits: TmdbCredits = self.get_json(&url, &[]).await?;
        Ok(credits.into())
    }

    async fn fetch_user_feed(
        &self,
        media_type: MediaType,
        token: &str,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>> {
        // Account id 0 resolves to the session owner on TMDB v3
        let path = match media_type {
            MediaType::Movie => "movies",
            MediaType::Series => "tv",
        };
        let url = format!("{}/account/0/watchlist/{}", self.api_url, path);
        let params = [
            ("session_id", token.to_string()),
            ("sort_by", "created_at.desc".to_string()),
        ];
        self.fetch_list(&url, &params, media_type, CandidateSource::UserFeed, limit)
            .await
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

fn media_path(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "tv",
    }
}

/// Year from a TMDB date string ("1999-10-15")
fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

// ============================================================================
// TMDB wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TmdbPage {
    #[serde(default)]
    results: Vec<TmdbListItem>,
}

/// One entry of a TMDB list response
///
/// Movie entries carry `title`/`release_date`, series entries carry
/// `name`/`first_air_date`; aliases fold both shapes into one struct.
#[derive(Debug, Deserialize)]
struct TmdbListItem {
    id: i64,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "original_name")]
    original_title: Option<String>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    genre_ids: Vec<i64>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    vote_count: Option<u32>,
    #[serde(default)]
    popularity: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct TmdbDetails {
    id: i64,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "original_name")]
    original_title: Option<String>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    vote_average: Option<f32>,
    #[serde(default)]
    vote_count: Option<u32>,
    #[serde(default)]
    popularity: Option<f32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    external_ids: Option<TmdbExternalIds>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    tagline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    #[serde(default)]
    imdb_id: Option<String>,
}

impl TmdbDetails {
    fn into_candidate(self, media_type: MediaType) -> RawCandidate {
        // Movie details expose imdb_id directly; series only via external_ids
        let imdb_id = self
            .imdb_id
            .or_else(|| self.external_ids.and_then(|ids| ids.imdb_id))
            .filter(|id| !id.is_empty());

        let runtime_minutes = self
            .runtime
            .or_else(|| self.episode_run_time.first().copied());

        RawCandidate {
            tmdb_id: self.id,
            media_type,
            imdb_id,
            title: self.title.unwrap_or_default(),
            original_title: self.original_title,
            language: self.original_language,
            overview: self.overview.filter(|o| !o.is_empty()),
            release_year: self.release_date.as_deref().and_then(parse_year),
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            genres: self.genres.into_iter().map(|g| g.name).collect(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            source: CandidateSource::Discover,
            seed_tmdb_id: None,
            cast: Vec::new(),
            directors: Vec::new(),
            runtime_minutes,
            tagline: self.tagline.filter(|t| !t.is_empty()),
            score_penalty: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    cast: Vec<TmdbCastMember>,
    #[serde(default)]
    crew: Vec<TmdbCrewMember>,
}

#[derive(Debug, Deserialize)]
struct TmdbCastMember {
    id: i64,
    name: String,
    #[serde(default)]
    character: Option<String>,
    #[serde(default)]
    profile_path: Option<String>,
    #[serde(default)]
    order: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbCrewMember {
    name: String,
    #[serde(default)]
    job: Option<String>,
}

impl From<TmdbCredits> for Credits {
    fn from(credits: TmdbCredits) -> Self {
        let mut cast = credits.cast;
        cast.sort_by_key(|member| member.order.unwrap_or(u32::MAX));

        let cast = cast
            .into_iter()
            .take(MAX_CAST)
            .map(|member| CastMember {
                tmdb_id: member.id,
                name: member.name,
                character: member.character,
                profile_path: member.profile_path,
            })
            .collect();

        let mut directors: Vec<String> = Vec::new();
        for member in credits.crew {
            if member.job.as_deref() == Some("Director") && !directors.contains(&member.name) {
                directors.push(member.name);
            }
        }

        Credits { cast, directors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider() -> TmdbProvider {
        let mut genre_names = HashMap::new();
        genre_names.insert(18, "Drama".to_string());
        genre_names.insert(53, "Thriller".to_string());

        TmdbProvider {
            http_client: reqwest::Client::new(),
            api_key: Some("test_key".to_string()),
            api_url: "http://test.local".to_string(),
            genre_names,
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(create_test_provider().is_configured());

        let unconfigured = TmdbProvider {
            http_client: reqwest::Client::new(),
            api_key: None,
            api_url: "http://test.local".to_string(),
            genre_names: HashMap::new(),
        };
        assert!(!unconfigured.is_configured());
    }

    #[test]
    fn test_empty_key_is_unconfigured() {
        let provider = TmdbProvider {
            http_client: reqwest::Client::new(),
            api_key: Some(String::new()),
            api_url: "http://test.local".to_string(),
            genre_names: HashMap::new(),
        };
        assert!(!provider.is_configured());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("1999-10-15"), Some(1999));
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("bad"), None);
    }

    #[test]
    fn test_movie_list_item_deserialization() {
        let json = r#"{
            "id": 550,
            "title": "Fight Club",
            "original_title": "Fight Club",
            "original_language": "en",
            "overview": "An insomniac office worker...",
            "release_date": "1999-10-15",
            "poster_path": "/poster.jpg",
            "genre_ids": [18, 53],
            "vote_average": 8.4,
            "vote_count": 26280,
            "popularity": 61.4
        }"#;

        let item: TmdbListItem = serde_json::from_str(json).unwrap();
        let candidate =
            create_test_provider().to_candidate(item, MediaType::Movie, CandidateSource::Popular);

        assert_eq!(candidate.tmdb_id, 550);
        assert_eq!(candidate.title, "Fight Club");
        assert_eq!(candidate.release_year, Some(1999));
        assert_eq!(candidate.genres, vec!["Drama".to_string(), "Thriller".to_string()]);
        assert_eq!(candidate.source, CandidateSource::Popular);
    }

    #[test]
    fn test_series_list_item_uses_name_aliases() {
        let json = r#"{
            "id": 1396,
            "name": "Breaking Bad",
            "original_name": "Breaking Bad",
            "first_air_date": "2008-01-20",
            "genre_ids": [18]
        }"#;

        let item: TmdbListItem = serde_json::from_str(json).unwrap();
        let candidate =
            create_test_provider().to_candidate(item, MediaType::Series, CandidateSource::Trending);

        assert_eq!(candidate.title, "Breaking Bad");
        assert_eq!(candidate.release_year, Some(2008));
        assert_eq!(candidate.genres, vec!["Drama".to_string()]);
    }

    #[test]
    fn test_unknown_genre_ids_are_skipped() {
        let json = r#"{"id": 1, "title": "X", "genre_ids": [18, 9999]}"#;
        let item: TmdbListItem = serde_json::from_str(json).unwrap();
        let candidate =
            create_test_provider().to_candidate(item, MediaType::Movie, CandidateSource::Discover);
        assert_eq!(candidate.genres, vec!["Drama".to_string()]);
    }

    #[test]
    fn test_details_prefers_direct_imdb_id() {
        let json = r#"{
            "id": 550,
            "title": "Fight Club",
            "imdb_id": "tt0137523",
            "external_ids": {"imdb_id": "tt9999999"},
            "runtime": 139,
            "tagline": "Mischief. Mayhem. Soap."
        }"#;

        let details: TmdbDetails = serde_json::from_str(json).unwrap();
        let candidate = details.into_candidate(MediaType::Movie);

        assert_eq!(candidate.imdb_id.as_deref(), Some("tt0137523"));
        assert_eq!(candidate.runtime_minutes, Some(139));
        assert_eq!(candidate.tagline.as_deref(), Some("Mischief. Mayhem. Soap."));
    }

    #[test]
    fn test_series_details_fall_back_to_external_ids() {
        let json = r#"{
            "id": 1396,
            "name": "Breaking Bad",
            "external_ids": {"imdb_id": "tt0903747"},
            "episode_run_time": [45, 47]
        }"#;

        let details: TmdbDetails = serde_json::from_str(json).unwrap();
        let candidate = details.into_candidate(MediaType::Series);

        assert_eq!(candidate.imdb_id.as_deref(), Some("tt0903747"));
        assert_eq!(candidate.runtime_minutes, Some(45));
    }

    #[test]
    fn test_credits_conversion_caps_cast_and_dedups_directors() {
        let cast: Vec<TmdbCastMember> = (0..15)
            .map(|i| TmdbCastMember {
                id: i,
                name: format!("Actor {}", i),
                character: None,
                profile_path: None,
                order: Some(i as u32),
            })
            .collect();
        let crew = vec![
            TmdbCrewMember {
                name: "David Fincher".to_string(),
                job: Some("Director".to_string()),
            },
            TmdbCrewMember {
                name: "David Fincher".to_string(),
                job: Some("Director".to_string()),
            },
            TmdbCrewMember {
                name: "Jim Uhls".to_string(),
                job: Some("Screenplay".to_string()),
            },
        ];

        let credits: Credits = TmdbCredits { cast, crew }.into();

        assert_eq!(credits.cast.len(), 10);
        assert_eq!(credits.cast[0].name, "Actor 0");
        assert_eq!(credits.directors, vec!["David Fincher".to_string()]);
    }
}
