pub mod candidate;
pub mod evidence;
pub mod pool;
pub mod run;

pub use candidate::{
    CandidateSource, CastMember, MediaType, RawCandidate, ScoredCandidate, SelectionResult,
};
pub use evidence::{Evidence, EvidenceType, WatchedNeighbor};
pub use pool::PoolSnapshot;
pub use run::{Run, RunCounts, RunStatus};
