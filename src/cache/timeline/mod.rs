//! Timeline assembly: segment planning, execution and delivery.

pub mod multiplexer;
pub mod planner;
pub mod runner;

pub use multiplexer::{ChunkSize, DeliveryBatch, DeliveryBuffer, MessageStream};
pub use planner::{SegmentSource, TimelineSegment, plan};
pub use runner::{RunnerDeps, TimelineRunner};
