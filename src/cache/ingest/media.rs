//! Attachment policy checks and downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use crate::cache::core::config::{FetchConfig, MediaPolicy};
use crate::cache::core::errors::{EngineResult, RemoteError};
use crate::cache::core::ids::{ConversationId, MediaId, MessageId};
use crate::cache::core::message::{MediaHandle, RawAttachment};
use crate::cache::remote::clock::Clock;
use crate::cache::remote::source::RemoteSource;
use crate::cache::storage::range_store::NewMediaRow;

/// Why an attachment was not downloaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Downloads are switched off for the request.
    DownloadsDisabled,
    /// The category is not on the allow-list.
    CategoryDisabled,
    /// The declared size exceeds the ceiling.
    TooLarge {
        /// Size declared by the source.
        declared: u64,
        /// Active ceiling.
        limit: u64,
    },
    /// Every download attempt failed.
    DownloadFailed(String),
}

/// Outcome of the policy check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MediaDecision {
    /// Fetch the bytes.
    Download,
    /// Leave the attachment as metadata only.
    Skip(SkipReason),
}

/// Decide whether `attachment` may be downloaded under `policy`.
#[must_use]
pub fn evaluate(policy: &MediaPolicy, attachment: &RawAttachment) -> MediaDecision {
    if !policy.download_media {
        return MediaDecision::Skip(SkipReason::DownloadsDisabled);
    }
    if !policy.file_types.allows(attachment.category) {
        return MediaDecision::Skip(SkipReason::CategoryDisabled);
    }
    if let Some(limit) = policy.size_ceiling() {
        if attachment.declared_size > limit {
            return MediaDecision::Skip(SkipReason::TooLarge {
                declared: attachment.declared_size,
                limit,
            });
        }
    }
    MediaDecision::Download
}

/// Builds deterministic, filesystem-safe attachment paths.
#[derive(Clone, Debug)]
pub struct FileNamer {
    unsafe_chars: Regex,
}

impl FileNamer {
    /// Compile the file name filter.
    ///
    /// # Errors
    /// Returns an error if the filter pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            unsafe_chars: Regex::new(r"[^A-Za-z0-9._-]")?,
        })
    }

    /// Local path `<media_dir>/<message_id>-<stem><ext>`.
    #[must_use]
    pub fn target_path(
        &self,
        media_dir: &Path,
        message_id: MessageId,
        attachment: &RawAttachment,
    ) -> PathBuf {
        let fallback = attachment.category.default_file_name();
        let name = attachment
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback);
        let name = Path::new(name);
        let fallback = Path::new(fallback);

        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| self.sanitize(s))
            .filter(|s| !s.is_empty())
            .or_else(|| {
                fallback
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| self.sanitize(s))
            })
            .unwrap_or_default();
        let ext = name
            .extension()
            .or_else(|| fallback.extension())
            .and_then(|e| e.to_str())
            .map(|e| self.sanitize(e))
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        media_dir.join(format!("{message_id}-{stem}{ext}"))
    }

    fn sanitize(&self, raw: &str) -> String {
        self.unsafe_chars.replace_all(raw, "_").into_owned()
    }
}

/// Result of processing one attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MediaOutcome {
    /// Bytes are on disk; the row is ready to insert.
    Downloaded(NewMediaRow),
    /// Nothing was written.
    Skipped(SkipReason),
}

/// Downloads attachments with bounded retries.
pub struct MediaPipeline {
    remote: Arc<dyn RemoteSource>,
    namer: FileNamer,
    clock: Arc<dyn Clock>,
    attempts: u32,
    max_wait: Duration,
}

impl MediaPipeline {
    /// Build a pipeline over `remote`.
    ///
    /// # Errors
    /// Returns an error if the file name filter cannot be compiled.
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
        config: &FetchConfig,
    ) -> EngineResult<Self> {
        Ok(Self {
            remote,
            namer: FileNamer::new()?,
            clock,
            attempts: config.media_download_attempts.max(1),
            max_wait: Duration::from_secs(config.max_retry_wait_seconds),
        })
    }

    /// Check `attachment` against `policy` and download it when allowed.
    ///
    /// Failures never propagate: after the last attempt the attachment is
    /// reported as skipped and any partial file is removed.
    pub async fn process(
        &self,
        conversation: &ConversationId,
        media_dir: &Path,
        message_id: MessageId,
        attachment: &RawAttachment,
        policy: &MediaPolicy,
    ) -> MediaOutcome {
        if let MediaDecision::Skip(reason) = evaluate(policy, attachment) {
            debug!(
                conversation = %conversation,
                message_id = %message_id,
                category = %attachment.category,
                reason = ?reason,
                "Skipping media"
            );
            return MediaOutcome::Skipped(reason);
        }

        let path = self.namer.target_path(media_dir, message_id, attachment);
        match self.download(conversation, &attachment.handle, &path).await {
            Ok(size) => MediaOutcome::Downloaded(NewMediaRow {
                id: MediaId::new(),
                message_id,
                path,
                size,
                mime_type: Some(
                    attachment
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| attachment.category.default_mime().to_string()),
                ),
                original_filename: attachment.file_name.clone(),
                created_at_millis: Utc::now().timestamp_millis(),
            }),
            Err(err) => {
                warn!(
                    conversation = %conversation,
                    message_id = %message_id,
                    error = %err,
                    "Media download failed, skipping"
                );
                MediaOutcome::Skipped(SkipReason::DownloadFailed(err.to_string()))
            }
        }
    }

    async fn download(
        &self,
        conversation: &ConversationId,
        handle: &MediaHandle,
        path: &Path,
    ) -> Result<u64, RemoteError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.remote.download_media(conversation, handle, path).await {
                Ok(size) => return Ok(size),
                Err(err) => err,
            };
            remove_file_quietly(path).await;

            let delay = match &err {
                RemoteError::RateLimited { retry_after } if *retry_after <= self.max_wait => {
                    *retry_after
                }
                RemoteError::TransientNetwork(_) => Duration::from_secs(1_u64 << (attempt - 1).min(6)),
                _ => return Err(err),
            };
            if attempt >= self.attempts {
                return Err(err);
            }
            debug!(
                handle = handle.as_str(),
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying media download"
            );
            self.clock.sleep(delay).await;
        }
    }
}

/// Remove `path`, ignoring a file that is already gone.
pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove media file"),
    }
}
