//! Configuration for the message cache engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::core::errors::{EngineError, EngineResult};
use crate::cache::core::message::MediaCategory;

/// Environment variable overriding [`StorageConfig::data_dir`].
pub const ENV_DATA_DIR: &str = "TELECACHE_DATA_DIR";
/// Environment variable overriding [`FetchConfig::batch_size`].
pub const ENV_FETCH_BATCH_SIZE: &str = "TELECACHE_FETCH_BATCH_SIZE";

/// Upper bound for [`FetchConfig::batch_size`]; one batch is one write transaction.
pub const MAX_FETCH_BATCH_SIZE: usize = 10_000;

/// Top-level configuration for the cache engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Remote fetch settings.
    pub fetch: FetchConfig,
    /// Default media policy, used when a request does not carry its own.
    pub media: MediaPolicy,
}

impl EngineConfig {
    /// Parse a JSON configuration document. Missing sections take defaults.
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TELECACHE_*` environment overrides.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed.
    pub fn with_env_overrides(mut self) -> EngineResult<Self> {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(ENV_FETCH_BATCH_SIZE) {
            self.fetch.batch_size = raw.trim().parse().map_err(|_| {
                EngineError::InvalidConfig(format!("{ENV_FETCH_BATCH_SIZE} is not a number: {raw}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> EngineResult<()> {
        if self.storage.cache_page_size == 0 {
            return Err(EngineError::InvalidConfig(
                "storage.cache_page_size must be > 0".to_string(),
            ));
        }

        if self.storage.open_store_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "storage.open_store_capacity must be > 0".to_string(),
            ));
        }

        if self.fetch.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "fetch.batch_size must be > 0".to_string(),
            ));
        }

        if self.fetch.batch_size > MAX_FETCH_BATCH_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "fetch.batch_size must be <= {MAX_FETCH_BATCH_SIZE}"
            )));
        }

        if self.fetch.media_download_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "fetch.media_download_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage configuration for cached conversations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; partitions live under `<data_dir>/channels/<id>/`.
    pub data_dir: PathBuf,
    /// Rows read per page when serving cached segments.
    pub cache_page_size: usize,
    /// Maximum number of conversation stores kept open.
    pub open_store_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_page_size: 500,
            open_store_capacity: 32,
        }
    }
}

/// Remote fetch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Messages per remote fetch, and per commit transaction.
    pub batch_size: usize,
    /// Longest rate-limit pause the engine sits out on its own.
    pub max_retry_wait_seconds: u64,
    /// Consecutive rate-limit pauses allowed for one fetch position.
    pub max_rate_limit_retries: u32,
    /// Attempts per media download before recording a skip.
    pub media_download_attempts: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retry_wait_seconds: 300,
            max_rate_limit_retries: 5,
            media_download_attempts: 3,
        }
    }
}

/// Per-category download toggles.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DownloadFileTypes {
    /// Photos.
    pub photos: bool,
    /// Regular videos.
    pub videos: bool,
    /// Round video messages.
    pub video_messages: bool,
    /// Voice notes.
    pub voice_messages: bool,
    /// Stickers.
    pub stickers: bool,
    /// Animations.
    pub gifs: bool,
    /// Any other document.
    pub files: bool,
}

impl Default for DownloadFileTypes {
    fn default() -> Self {
        Self {
            photos: true,
            videos: true,
            video_messages: true,
            voice_messages: true,
            stickers: true,
            gifs: true,
            files: true,
        }
    }
}

impl DownloadFileTypes {
    /// Whether `category` may be downloaded.
    #[must_use]
    pub const fn allows(&self, category: MediaCategory) -> bool {
        match category {
            MediaCategory::Photo => self.photos,
            MediaCategory::Video => self.videos,
            MediaCategory::VideoMessage => self.video_messages,
            MediaCategory::Voice => self.voice_messages,
            MediaCategory::Sticker => self.stickers,
            MediaCategory::Gif => self.gifs,
            MediaCategory::Document => self.files,
        }
    }
}

/// Media download policy. Passed by value with each request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPolicy {
    /// Master switch for attachment downloads.
    pub download_media: bool,
    /// Declared-size ceiling in bytes; `None` or `0` means unlimited.
    pub max_media_size_bytes: Option<u64>,
    /// Category allow-list.
    pub file_types: DownloadFileTypes,
    /// Backfill previously skipped or missing media.
    pub repair: bool,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            download_media: true,
            max_media_size_bytes: Some(20 * 1024 * 1024),
            file_types: DownloadFileTypes::default(),
            repair: false,
        }
    }
}

impl MediaPolicy {
    /// Policy that never downloads anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            download_media: false,
            ..Self::default()
        }
    }

    /// Effective ceiling, with `0` folded into "unlimited".
    #[must_use]
    pub const fn size_ceiling(&self) -> Option<u64> {
        match self.max_media_size_bytes {
            Some(0) | None => None,
            Some(limit) => Some(limit),
        }
    }
}
