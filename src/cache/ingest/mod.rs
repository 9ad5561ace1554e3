//! Write path: gap detection, media handling and atomic commits.

pub mod committer;
pub mod gaps;
pub mod media;

pub use committer::{BatchCommitter, CommitReport, RepairReport};
pub use gaps::{CoverageSplit, covered_part, find_gaps};
pub use media::{FileNamer, MediaDecision, MediaOutcome, MediaPipeline, SkipReason, evaluate};
