use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a discovery run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Volume counters reported when a run is finalized
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCounts {
    pub total_fetched: usize,
    pub unique_candidates: usize,
    pub selected: usize,
}

/// One pipeline execution for one user, or one global refresh
///
/// Created at pipeline start and finalized exactly once, with either
/// completed counts or a readable error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    /// None for global refresh jobs
    pub user_id: Option<Uuid>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl Run {
    pub fn start(user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error: None,
        }
    }
}
