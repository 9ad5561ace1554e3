//! On-disk layout of conversation partitions.
//!
//! ```text
//! <data_dir>/channels/<conversation>/<conversation>.db
//! <data_dir>/channels/<conversation>/media/
//! ```

use std::path::{Path, PathBuf};

use crate::cache::core::ids::ConversationId;

/// Directory holding every conversation partition.
#[must_use]
pub fn channels_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("channels")
}

/// Canonical paths for a conversation's database and media directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConversationPaths {
    /// Partition root.
    pub dir: PathBuf,
    /// `SQLite` database file.
    pub db_file: PathBuf,
    /// Downloaded attachments.
    pub media_dir: PathBuf,
}

impl ConversationPaths {
    /// Compute the partition paths for `conversation` under `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path, conversation: &ConversationId) -> Self {
        let dir = channels_dir(data_dir).join(conversation.as_str());
        let db_file = dir.join(format!("{conversation}.db"));
        let media_dir = dir.join("media");
        Self {
            dir,
            db_file,
            media_dir,
        }
    }

    /// Create the partition directories if missing.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.media_dir).await
    }
}
