use serde::{Deserialize, Serialize};

/// Why a watched item counts as evidence for a recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Favorite,
    HighlyRated,
    Watched,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Favorite => "favorite",
            EvidenceType::HighlyRated => "highly_rated",
            EvidenceType::Watched => "watched",
        }
    }
}

/// A watched item returned by nearest-neighbor search, with the engagement
/// metadata the evidence type is derived from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedNeighbor {
    pub tmdb_id: i64,
    pub similarity: f32,
    pub is_favorite: bool,
    pub play_count: u32,
}

/// One watched item cited to justify a selected candidate
///
/// At most three evidence entries exist per selected candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// The selected candidate being justified
    pub candidate_tmdb_id: i64,
    /// The watched item cited as justification
    pub watched_tmdb_id: i64,
    pub similarity: f32,
    pub evidence_type: EvidenceType,
}

impl Evidence {
    /// Builds evidence from a watched neighbor, deriving the type from the
    /// neighbor's own engagement metadata: favorite flag first, then repeat
    /// plays, then plain watched.
    pub fn from_neighbor(candidate_tmdb_id: i64, neighbor: &WatchedNeighbor) -> Self {
        let evidence_type = if neighbor.is_favorite {
            EvidenceType::Favorite
        } else if neighbor.play_count > 1 {
            EvidenceType::HighlyRated
        } else {
            EvidenceType::Watched
        };

        Self {
            candidate_tmdb_id,
            watched_tmdb_id: neighbor.tmdb_id,
            similarity: neighbor.similarity,
            evidence_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(is_favorite: bool, play_count: u32) -> WatchedNeighbor {
        WatchedNeighbor {
            tmdb_id: 603,
            similarity: 0.91,
            is_favorite,
            play_count,
        }
    }

    #[test]
    fn test_favorite_wins_over_play_count() {
        let e = Evidence::from_neighbor(550, &neighbor(true, 5));
        assert_eq!(e.evidence_type, EvidenceType::Favorite);
    }

    #[test]
    fn test_repeat_plays_are_highly_rated() {
        let e = Evidence::from_neighbor(550, &neighbor(false, 2));
        assert_eq!(e.evidence_type, EvidenceType::HighlyRated);
    }

    #[test]
    fn test_single_play_is_watched() {
        let e = Evidence::from_neighbor(550, &neighbor(false, 1));
        assert_eq!(e.evidence_type, EvidenceType::Watched);
    }

    #[test]
    fn test_evidence_type_serialization() {
        assert_eq!(
            serde_json::to_string(&EvidenceType::HighlyRated).unwrap(),
            "\"highly_rated\""
        );
    }
}
