//! Conversation cache engine.
//!
//! Serves time windows of remote conversation histories from a local cache,
//! fetching only the parts that are missing. Organized into:
//! - `core`: configuration, errors, identifiers, windows and the message model
//! - `storage`: per-conversation `SQLite` partitions and the open-store registry
//! - `remote`: the remote source boundary, backoff clock and paged fetcher
//! - `ingest`: gap detection, media downloads and atomic batch commits
//! - `timeline`: segment planning, execution and delivery re-chunking
//! - `engine`: the public facade
//! - `telemetry`: tracing setup

pub mod core;
pub mod engine;
pub mod ingest;
pub mod remote;
pub mod storage;
pub mod telemetry;
pub mod timeline;

#[cfg(test)]
pub(crate) mod testing;

pub use self::core::{
    ConversationId, Cursor, Direction, DownloadFileTypes, EngineConfig, EngineError, EngineResult,
    FetchConfig, MediaCategory, MediaId, MediaLocation, MediaPolicy, MediaRef, MessageId,
    MessageRecord, RangeSummary, RawAttachment, RawMessage, RemoteError, StorageConfig,
    TimeWindow,
};
pub use engine::{CacheEngine, RepairReport, StreamRequest};
pub use remote::{Clock, FetchQuery, RemoteFuture, RemoteSource, SystemClock};
pub use telemetry::init_tracing;
pub use timeline::{ChunkSize, DeliveryBatch, MessageStream};
