/// Discovery pipeline errors
///
/// Partial failures inside a run (a single source or enrichment fetch going
/// bad) are handled locally and never surface here; this taxonomy covers the
/// failures that reject a run up front or abort it at the persistence stage.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No candidates: {0}")]
    NoCandidates(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiscoveryError {
    /// Whether this error should mark the owning run as failed
    ///
    /// Configuration errors are rejected before a run record exists, so only
    /// exhaustion and persistence-layer failures are run-fatal.
    pub fn is_run_fatal(&self) -> bool {
        !matches!(self, DiscoveryError::InvalidConfig(_))
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
