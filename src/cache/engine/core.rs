//! Cache engine orchestration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::core::config::{EngineConfig, MediaPolicy};
use crate::cache::core::errors::EngineResult;
use crate::cache::core::ids::{ConversationId, MediaId};
use crate::cache::core::message::MediaLocation;
use crate::cache::core::window::{Direction, RangeSummary, TimeWindow};
use crate::cache::ingest::committer::{BatchCommitter, RepairReport};
use crate::cache::ingest::media::MediaPipeline;
use crate::cache::remote::clock::{Clock, SystemClock};
use crate::cache::remote::source::RemoteSource;
use crate::cache::storage::range_store::MessageStore;
use crate::cache::storage::registry::StoreRegistry;
use crate::cache::timeline::multiplexer::{ChunkSize, MessageStream};
use crate::cache::timeline::planner::{SegmentSource, plan};
use crate::cache::timeline::runner::{RunnerDeps, TimelineRunner};

/// Parameters of one stream request.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    /// Conversation to read.
    pub conversation: ConversationId,
    /// Inclusive window.
    pub window: TimeWindow,
    /// Output order.
    pub direction: Direction,
    /// Delivery granularity.
    pub chunk: ChunkSize,
    /// Ignore the cache and re-fetch the whole window.
    pub force_refresh: bool,
    /// Media policy for this request; the configured default when `None`.
    pub policy: Option<MediaPolicy>,
}

impl StreamRequest {
    /// Ascending, single-batch request using the default media policy.
    #[must_use]
    pub fn new(conversation: ConversationId, window: TimeWindow) -> Self {
        Self {
            conversation,
            window,
            direction: Direction::Ascending,
            chunk: ChunkSize::Whole,
            force_refresh: false,
            policy: None,
        }
    }

    /// Set the output order.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the delivery granularity.
    #[must_use]
    pub fn chunk(mut self, chunk: ChunkSize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Re-fetch the whole window from the remote.
    #[must_use]
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Use `policy` instead of the configured default.
    #[must_use]
    pub fn policy(mut self, policy: MediaPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Cache-aware message stream engine.
pub struct CacheEngine {
    config: EngineConfig,
    registry: Arc<StoreRegistry>,
    committer: Arc<BatchCommitter>,
    remote: Arc<dyn RemoteSource>,
    clock: Arc<dyn Clock>,
}

impl CacheEngine {
    /// Create an engine over `remote` using wall-clock backoff.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EngineConfig, remote: Arc<dyn RemoteSource>) -> EngineResult<Self> {
        Self::with_clock(config, remote, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit backoff clock.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn with_clock(
        config: EngineConfig,
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let registry = Arc::new(StoreRegistry::new(
            config.storage.data_dir.clone(),
            config.storage.open_store_capacity,
        )?);
        let media = Arc::new(MediaPipeline::new(
            Arc::clone(&remote),
            Arc::clone(&clock),
            &config.fetch,
        )?);
        let committer = Arc::new(BatchCommitter::new(Arc::clone(&registry), media));

        info!(data_dir = %config.storage.data_dir.display(), "Cache engine ready");
        Ok(Self {
            config,
            registry,
            committer,
            remote,
            clock,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stream a window of a conversation, serving cached parts locally and
    /// fetching only what is missing.
    ///
    /// # Errors
    /// Returns an error if the conversation's store cannot be opened or read.
    /// Failures after the stream started are delivered through the stream.
    pub async fn stream(&self, request: StreamRequest) -> EngineResult<MessageStream> {
        let StreamRequest {
            conversation,
            window,
            direction,
            chunk,
            force_refresh,
            policy,
        } = request;
        let policy = policy.unwrap_or_else(|| self.config.media.clone());

        let store = self.registry.store(&conversation).await?;
        let coverage = store.summary().await?.map(|summary| summary.covered());
        let segments = plan(window, coverage, direction, force_refresh);

        let pending = segments
            .iter()
            .filter(|s| s.source == SegmentSource::Pending)
            .count();
        info!(
            conversation = %conversation,
            window = %window,
            direction = %direction,
            force_refresh,
            segments = segments.len(),
            pending,
            "Planned stream"
        );

        let deps = RunnerDeps {
            store,
            committer: Arc::clone(&self.committer),
            remote: Arc::clone(&self.remote),
            clock: Arc::clone(&self.clock),
            fetch: self.config.fetch.clone(),
            page_size: self.config.storage.cache_page_size,
        };
        let runner = TimelineRunner::new(deps, conversation, direction, policy, segments);
        Ok(MessageStream::spawn(runner, chunk))
    }

    /// Find a downloaded attachment by its handle, across all conversations.
    ///
    /// # Errors
    /// Returns an error if a partition cannot be listed or read.
    pub async fn resolve_media(&self, id: MediaId) -> EngineResult<Option<MediaLocation>> {
        for conversation in self.registry.known_conversations().await? {
            let Some(store) = self.registry.existing_store(&conversation).await? else {
                continue;
            };
            if let Some(location) = store.find_media(id).await? {
                debug!(media = %id, conversation = %conversation, "Resolved media");
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    /// Backfill attachments missing from cached messages of `conversation`.
    /// Requires `policy.repair`; otherwise nothing is done.
    ///
    /// # Errors
    /// Returns an error if the scan or the media insert fails.
    pub async fn repair_media(
        &self,
        conversation: &ConversationId,
        window: Option<TimeWindow>,
        policy: MediaPolicy,
    ) -> EngineResult<RepairReport> {
        let Some(store) = self.registry.existing_store(conversation).await? else {
            return Ok(RepairReport::default());
        };
        self.committer
            .repair(conversation, &store, window, &policy)
            .await
    }

    /// What is cached for `conversation`; `None` when nothing is.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn coverage(&self, conversation: &ConversationId) -> EngineResult<Option<RangeSummary>> {
        match self.registry.existing_store(conversation).await? {
            Some(store) => store.summary().await,
            None => Ok(None),
        }
    }
}
