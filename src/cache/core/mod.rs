//! Core cache types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod window;

pub use config::{DownloadFileTypes, EngineConfig, FetchConfig, MediaPolicy, StorageConfig};
pub use errors::{EngineError, EngineResult, RemoteError};
pub use ids::{ConversationId, ConversationIdError, MediaId, MessageId};
pub use message::{
    Linkage, MediaCategory, MediaHandle, MediaLocation, MediaRef, MessageRecord, RawAttachment,
    RawMessage, SenderInfo,
};
pub use window::{Cursor, Direction, RangeSummary, TimeWindow};
