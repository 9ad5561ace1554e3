//! Atomic batch commits and media backfill.
//!
//! Both writers here hold the conversation's write lock for the whole unit of
//! work. Attachments are downloaded before the `SQLite` transaction opens, so
//! the transaction itself only covers row writes. When the transaction fails,
//! the files downloaded for that unit are deleted again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::core::config::MediaPolicy;
use crate::cache::core::errors::EngineResult;
use crate::cache::core::ids::{ConversationId, MessageId};
use crate::cache::core::message::RawMessage;
use crate::cache::core::window::TimeWindow;
use crate::cache::ingest::media::{MediaOutcome, MediaPipeline, remove_file_quietly};
use crate::cache::storage::range_store::{NewMediaRow, SqliteRangeStore};
use crate::cache::storage::registry::StoreRegistry;

/// What one committed batch contained.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommitReport {
    /// Committed message ids, in fetch order.
    pub message_ids: Vec<MessageId>,
    /// Attachments downloaded and recorded.
    pub media_downloaded: usize,
    /// Attachments left as metadata only.
    pub media_skipped: usize,
}

/// Result of a media repair pass.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Messages found with an attachment but no media row.
    pub scanned: usize,
    /// Media rows inserted.
    pub downloaded: usize,
    /// Attachments still skipped by policy or failed downloads.
    pub skipped: usize,
}

/// The only writer of message and media rows.
pub struct BatchCommitter {
    registry: Arc<StoreRegistry>,
    media: Arc<MediaPipeline>,
}

impl BatchCommitter {
    /// Build a committer sharing the registry's write locks.
    #[must_use]
    pub const fn new(registry: Arc<StoreRegistry>, media: Arc<MediaPipeline>) -> Self {
        Self { registry, media }
    }

    /// Persist one fetched batch, all or nothing.
    ///
    /// # Errors
    /// Returns the storage error after the transaction was rolled back and
    /// the batch's downloaded files were removed.
    pub async fn commit(
        &self,
        conversation: &ConversationId,
        store: &SqliteRangeStore,
        batch: Vec<RawMessage>,
        policy: &MediaPolicy,
    ) -> EngineResult<CommitReport> {
        let _guard = self.registry.lock_writes(conversation).await;

        let message_ids: Vec<MessageId> = batch.iter().map(|m| m.id).collect();
        let with_media: Vec<MessageId> = batch
            .iter()
            .filter(|m| m.attachment.is_some())
            .map(|m| m.id)
            .collect();
        let existing = store.existing_media(with_media).await?;

        let mut rows = Vec::new();
        let mut skipped = 0;
        for msg in &batch {
            let Some(attachment) = &msg.attachment else {
                continue;
            };
            if let Some(path) = existing.get(&msg.id) {
                let missing = !tokio::fs::try_exists(path).await.unwrap_or(false);
                if !(policy.repair && missing) {
                    continue;
                }
                debug!(
                    conversation = %conversation,
                    message_id = %msg.id,
                    "Re-downloading missing media file"
                );
            }
            match self
                .media
                .process(conversation, &store.paths().media_dir, msg.id, attachment, policy)
                .await
            {
                MediaOutcome::Downloaded(row) => rows.push(row),
                MediaOutcome::Skipped(_) => skipped += 1,
            }
        }

        let media_downloaded = rows.len();
        let written = rows.clone();
        if let Err(err) = store.commit_batch(batch, rows, policy.repair).await {
            discard_files(&written).await;
            return Err(err);
        }

        info!(
            conversation = %conversation,
            messages = message_ids.len(),
            media_downloaded,
            media_skipped = skipped,
            "Committed batch"
        );
        Ok(CommitReport {
            message_ids,
            media_downloaded,
            media_skipped: skipped,
        })
    }

    /// Download and record attachments that cached messages still miss.
    /// Message rows are left untouched. Does nothing unless `policy.repair` is set.
    ///
    /// # Errors
    /// Returns an error if the scan or the media insert fails.
    pub async fn repair(
        &self,
        conversation: &ConversationId,
        store: &SqliteRangeStore,
        window: Option<TimeWindow>,
        policy: &MediaPolicy,
    ) -> EngineResult<RepairReport> {
        if !policy.repair {
            return Ok(RepairReport::default());
        }

        let _guard = self.registry.lock_writes(conversation).await;
        let pending = store.pending_media(window).await?;
        if pending.is_empty() {
            return Ok(RepairReport::default());
        }

        let mut rows = Vec::new();
        let mut skipped = 0;
        for item in &pending {
            match self
                .media
                .process(
                    conversation,
                    &store.paths().media_dir,
                    item.message_id,
                    &item.attachment,
                    policy,
                )
                .await
            {
                MediaOutcome::Downloaded(row) => rows.push(row),
                MediaOutcome::Skipped(_) => skipped += 1,
            }
        }

        let written = rows.clone();
        let downloaded = match store.insert_media(rows).await {
            Ok(inserted) => inserted,
            Err(err) => {
                discard_files(&written).await;
                return Err(err);
            }
        };

        info!(
            conversation = %conversation,
            scanned = pending.len(),
            downloaded,
            skipped,
            "Repaired missing media"
        );
        Ok(RepairReport {
            scanned: pending.len(),
            downloaded,
            skipped,
        })
    }
}

async fn discard_files(rows: &[NewMediaRow]) {
    for row in rows {
        remove_file_quietly(&row.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::core::config::FetchConfig;
    use crate::cache::core::message::MediaCategory;
    use crate::cache::core::window::Direction;
    use crate::cache::storage::range_store::MessageStore;
    use crate::cache::testing::{FakeRemote, ManualClock, attachment, text_at};

    struct Fixture {
        _dir: tempfile::TempDir,
        conversation: ConversationId,
        store: Arc<SqliteRangeStore>,
        committer: BatchCommitter,
        remote: Arc<FakeRemote>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(StoreRegistry::new(dir.path(), 4).unwrap());
        let conversation = ConversationId::new("c").unwrap();
        let store = registry.store(&conversation).await.unwrap();
        let remote = Arc::new(FakeRemote::default());
        let media = Arc::new(MediaPipeline::new(
            Arc::clone(&remote) as Arc<dyn crate::cache::remote::RemoteSource>,
            Arc::new(ManualClock::default()),
            &FetchConfig::default(),
        )
        .unwrap());
        Fixture {
            _dir: dir,
            conversation,
            store,
            committer: BatchCommitter::new(registry, media),
            remote,
        }
    }

    #[tokio::test]
    async fn test_commit_downloads_and_links_media() {
        let fx = fixture().await;
        let batch = vec![
            text_at(1, 1_000).with_attachment(attachment(MediaCategory::Photo, 10)),
            text_at(2, 2_000),
        ];
        let report = fx
            .committer
            .commit(&fx.conversation, &fx.store, batch, &MediaPolicy::default())
            .await
            .unwrap();
        assert_eq!(report.message_ids, vec![MessageId(1), MessageId(2)]);
        assert_eq!(report.media_downloaded, 1);
        assert_eq!(report.media_skipped, 0);

        let records = fx
            .store
            .read_by_ids(report.message_ids, Direction::Ascending)
            .await
            .unwrap();
        assert!(records[0].media.is_some());
        assert!(records[1].media.is_none());
    }

    #[tokio::test]
    async fn test_recommit_does_not_download_again() {
        let fx = fixture().await;
        let batch = vec![text_at(1, 1_000).with_attachment(attachment(MediaCategory::Photo, 10))];
        fx.committer
            .commit(&fx.conversation, &fx.store, batch.clone(), &MediaPolicy::default())
            .await
            .unwrap();
        let report = fx
            .committer
            .commit(&fx.conversation, &fx.store, batch, &MediaPolicy::default())
            .await
            .unwrap();
        assert_eq!(report.media_downloaded, 0);
        assert_eq!(fx.remote.download_calls(), 1);
    }

    #[tokio::test]
    async fn test_repair_redownload_keeps_media_id() {
        let fx = fixture().await;
        let batch = vec![text_at(1, 1_000).with_attachment(attachment(MediaCategory::Photo, 10))];
        fx.committer
            .commit(&fx.conversation, &fx.store, batch.clone(), &MediaPolicy::default())
            .await
            .unwrap();
        let before = fx
            .store
            .read_by_ids(vec![MessageId(1)], Direction::Ascending)
            .await
            .unwrap();
        let media_id = before[0].media.as_ref().unwrap().id;
        let location = fx.store.find_media(media_id).await.unwrap().unwrap();
        tokio::fs::remove_file(&location.path).await.unwrap();

        let repair = MediaPolicy {
            repair: true,
            ..MediaPolicy::default()
        };
        let report = fx
            .committer
            .commit(&fx.conversation, &fx.store, batch, &repair)
            .await
            .unwrap();
        assert_eq!(report.media_downloaded, 1);
        let location = fx.store.find_media(media_id).await.unwrap().unwrap();
        assert!(location.path.exists());
    }

    #[tokio::test]
    async fn test_failed_commit_removes_downloaded_files() {
        let fx = fixture().await;
        {
            let conn = rusqlite::Connection::open(&fx.store.paths().db_file).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER fail_two BEFORE INSERT ON messages
                 WHEN NEW.message_id = 2
                 BEGIN SELECT RAISE(ABORT, 'injected'); END;",
            )
            .unwrap();
        }
        let batch = vec![
            text_at(1, 1_000).with_attachment(attachment(MediaCategory::Photo, 10)),
            text_at(2, 2_000),
        ];
        let result = fx
            .committer
            .commit(&fx.conversation, &fx.store, batch, &MediaPolicy::default())
            .await;
        assert!(result.is_err());
        assert!(fx.store.summary().await.unwrap().is_none());
        assert!(!fx.store.paths().media_dir.join("1-photo.jpg").exists());
    }

    #[tokio::test]
    async fn test_repair_backfills_without_touching_messages() {
        let fx = fixture().await;
        let batch = vec![
            text_at(1, 1_000).with_attachment(attachment(MediaCategory::Video, 10)),
            text_at(2, 2_000).with_attachment(attachment(MediaCategory::Sticker, 10)),
        ];
        fx.committer
            .commit(&fx.conversation, &fx.store, batch, &MediaPolicy::disabled())
            .await
            .unwrap();

        let gated = fx
            .committer
            .repair(&fx.conversation, &fx.store, None, &MediaPolicy::default())
            .await
            .unwrap();
        assert_eq!(gated, RepairReport::default());

        let policy = MediaPolicy {
            repair: true,
            file_types: crate::cache::core::config::DownloadFileTypes {
                stickers: false,
                ..Default::default()
            },
            ..MediaPolicy::default()
        };
        let report = fx
            .committer
            .repair(&fx.conversation, &fx.store, None, &policy)
            .await
            .unwrap();
        assert_eq!(
            report,
            RepairReport {
                scanned: 2,
                downloaded: 1,
                skipped: 1
            }
        );

        let records = fx
            .store
            .read_by_ids(vec![MessageId(1), MessageId(2)], Direction::Ascending)
            .await
            .unwrap();
        assert!(records[0].media.is_some());
        assert!(records[1].media.is_none());
        assert_eq!(records[0].content, "message 1");
    }
}
