//! Persistent per-conversation storage.

pub mod paths;
pub mod range_store;
pub mod registry;

pub use paths::ConversationPaths;
pub use range_store::{MessageStore, NewMediaRow, PendingMedia, SqliteRangeStore, StoreFuture};
pub use registry::StoreRegistry;
