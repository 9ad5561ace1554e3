//! Message model: raw remote messages in, normalized records out.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::core::ids::{MediaId, MessageId};

/// User-facing attachment category, the key of the download allow-list.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    /// Photo.
    Photo,
    /// Regular video.
    Video,
    /// Round video message.
    VideoMessage,
    /// Voice note.
    Voice,
    /// Sticker.
    Sticker,
    /// Animation.
    Gif,
    /// Any other document.
    Document,
}

impl MediaCategory {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::VideoMessage => "video_message",
            Self::Voice => "voice",
            Self::Sticker => "sticker",
            Self::Gif => "gif",
            Self::Document => "document",
        }
    }

    /// Fallback file name when the source does not provide one.
    #[must_use]
    pub const fn default_file_name(self) -> &'static str {
        match self {
            Self::Photo => "photo.jpg",
            Self::Video | Self::VideoMessage => "video.mp4",
            Self::Voice => "voice.ogg",
            Self::Sticker => "sticker.webp",
            Self::Gif => "animation.mp4",
            Self::Document => "document.bin",
        }
    }

    /// Fallback MIME hint when the source does not provide one.
    #[must_use]
    pub const fn default_mime(self) -> &'static str {
        match self {
            Self::Photo => "image/jpeg",
            Self::Video | Self::VideoMessage | Self::Gif => "video/mp4",
            Self::Voice => "audio/ogg",
            Self::Sticker => "image/webp",
            Self::Document => "application/octet-stream",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "video_message" => Ok(Self::VideoMessage),
            "voice" => Ok(Self::Voice),
            "sticker" => Ok(Self::Sticker),
            "gif" => Ok(Self::Gif),
            "document" => Ok(Self::Document),
            _ => Err(value.to_string()),
        }
    }
}

/// Opaque token the remote client understands as "download this attachment".
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaHandle(pub String);

impl MediaHandle {
    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Attachment descriptor as reported by the remote source.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawAttachment {
    /// Attachment category.
    pub category: MediaCategory,
    /// Size the source declares, in bytes.
    pub declared_size: u64,
    /// Handle for on-demand download.
    pub handle: MediaHandle,
    /// Original file name, when the source knows it.
    pub file_name: Option<String>,
    /// MIME hint, when the source knows it.
    pub mime_type: Option<String>,
}

/// Sender identity attached to every message.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SenderInfo {
    /// Sender user or channel id (`0` when unknown).
    pub id: i64,
    /// First name, for user senders.
    pub first_name: Option<String>,
    /// Last name, for user senders.
    pub last_name: Option<String>,
    /// Public username.
    pub username: Option<String>,
}

/// Reply and forward linkage.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Linkage {
    /// Message this one replies to.
    pub reply_to: Option<MessageId>,
    /// Signature of the channel post author.
    pub post_author: Option<String>,
    /// Whether the message was forwarded.
    pub is_forwarded: bool,
    /// Source channel of a forward, when it was a channel.
    pub forwarded_from_channel_id: Option<i64>,
}

/// A message as produced by the remote source, before it is cached.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Source-assigned id.
    pub id: MessageId,
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Last edit time.
    pub edit_timestamp: Option<DateTime<Utc>>,
    /// Sender identity.
    pub sender: SenderInfo,
    /// Text content (empty for pure media).
    pub content: String,
    /// Reply/forward linkage.
    pub linkage: Linkage,
    /// Attachment, if any.
    pub attachment: Option<RawAttachment>,
}

impl RawMessage {
    /// Build a plain text message.
    #[must_use]
    pub fn text(id: i64, timestamp: DateTime<Utc>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            timestamp,
            edit_timestamp: None,
            sender: SenderInfo::default(),
            content: content.into(),
            linkage: Linkage::default(),
            attachment: None,
        }
    }

    /// Attach a media descriptor.
    #[must_use]
    pub fn with_attachment(mut self, attachment: RawAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Set the sender identity.
    #[must_use]
    pub fn with_sender(mut self, sender: SenderInfo) -> Self {
        self.sender = sender;
        self
    }

    /// Timestamp in Unix milliseconds, the resolution the cache stores.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Reference to a downloaded attachment in a delivered record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Opaque handle for [`resolve_media`](crate::cache::engine::CacheEngine::resolve_media).
    pub id: MediaId,
    /// Original file name when known.
    pub filename: Option<String>,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Normalized message record delivered to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Source-assigned id.
    pub message_id: MessageId,
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Last edit time.
    pub edit_timestamp: Option<DateTime<Utc>>,
    /// Sender identity.
    pub sender: SenderInfo,
    /// Text content.
    pub content: String,
    /// Reply/forward linkage.
    pub linkage: Linkage,
    /// Attachment category, present even when the bytes were skipped.
    pub media_category: Option<MediaCategory>,
    /// Downloaded attachment, if any.
    pub media: Option<MediaRef>,
}

/// Where a downloaded attachment lives.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MediaLocation {
    /// Media handle.
    pub id: MediaId,
    /// Absolute or data-dir relative file path.
    pub path: PathBuf,
    /// Original file name when known.
    pub original_filename: Option<String>,
    /// Size on disk in bytes.
    pub size: u64,
    /// MIME hint.
    pub mime_type: Option<String>,
}
