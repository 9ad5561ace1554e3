//! Executes a segment plan, producing ordered record pages.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::cache::core::config::{FetchConfig, MediaPolicy};
use crate::cache::core::errors::EngineResult;
use crate::cache::core::ids::ConversationId;
use crate::cache::core::message::MessageRecord;
use crate::cache::core::window::{Cursor, Direction, TimeWindow};
use crate::cache::ingest::committer::BatchCommitter;
use crate::cache::remote::clock::Clock;
use crate::cache::remote::fetcher::FetchSession;
use crate::cache::remote::source::RemoteSource;
use crate::cache::storage::range_store::{MessageStore, SqliteRangeStore};
use crate::cache::timeline::planner::{SegmentSource, TimelineSegment};

/// Shared collaborators a runner needs.
#[derive(Clone)]
pub struct RunnerDeps {
    /// Store of the requested conversation.
    pub store: Arc<SqliteRangeStore>,
    /// Write path for fetched batches.
    pub committer: Arc<BatchCommitter>,
    /// Remote history.
    pub remote: Arc<dyn RemoteSource>,
    /// Backoff clock.
    pub clock: Arc<dyn Clock>,
    /// Fetch limits.
    pub fetch: FetchConfig,
    /// Rows per cached page.
    pub page_size: usize,
}

enum ActiveSegment {
    Cached {
        window: TimeWindow,
        after: Option<Cursor>,
    },
    Pending(Box<FetchSession>),
}

/// Walks the plan one segment at a time.
///
/// Cached segments are read in keyset pages. Pending segments are fetched,
/// committed, and read back from the store so that delivered records always
/// reflect what was persisted.
pub struct TimelineRunner {
    deps: RunnerDeps,
    conversation: ConversationId,
    direction: Direction,
    policy: MediaPolicy,
    segments: VecDeque<TimelineSegment>,
    active: Option<ActiveSegment>,
}

impl TimelineRunner {
    /// Build a runner over an already ordered plan.
    #[must_use]
    pub fn new(
        deps: RunnerDeps,
        conversation: ConversationId,
        direction: Direction,
        policy: MediaPolicy,
        segments: Vec<TimelineSegment>,
    ) -> Self {
        Self {
            deps,
            conversation,
            direction,
            policy,
            segments: segments.into(),
            active: None,
        }
    }

    /// Next non-empty page in output order, or `None` when the plan is done.
    ///
    /// A remote fetch, including its rate-limit pauses, is abandoned as soon as
    /// `cancelled` resolves, and `None` is returned. Commits are never cut short.
    ///
    /// # Errors
    /// Returns storage, remote or commit failures. The runner should not be
    /// polled again after an error.
    pub async fn next_rows<F>(&mut self, cancelled: F) -> EngineResult<Option<Vec<MessageRecord>>>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(cancelled);
        loop {
            if self.active.is_none() {
                let Some(segment) = self.segments.pop_front() else {
                    return Ok(None);
                };
                let started = self.start(segment).await?;
                self.active = Some(started);
            }
            let Some(active) = self.active.as_mut() else {
                continue;
            };

            let rows = match active {
                ActiveSegment::Cached { window, after } => {
                    let rows = self
                        .deps
                        .store
                        .read_page(*window, self.direction, *after, self.deps.page_size)
                        .await?;
                    if let Some(last) = rows.last() {
                        *after = Some(Cursor {
                            timestamp_millis: last.timestamp.timestamp_millis(),
                            message_id: last.message_id,
                        });
                    }
                    rows
                }
                ActiveSegment::Pending(session) => {
                    let fetched = tokio::select! {
                        biased;
                        () = &mut cancelled => {
                            debug!(conversation = %self.conversation, "Fetch abandoned, stream closed");
                            return Ok(None);
                        }
                        fetched = session.next_batch() => fetched?,
                    };
                    match fetched {
                        Some(batch) => {
                            let report = self
                                .deps
                                .committer
                                .commit(&self.conversation, &self.deps.store, batch, &self.policy)
                                .await?;
                            self.deps
                                .store
                                .read_by_ids(report.message_ids, self.direction)
                                .await?
                        }
                        None => Vec::new(),
                    }
                }
            };

            if rows.is_empty() {
                self.active = None;
                continue;
            }
            return Ok(Some(rows));
        }
    }

    async fn start(&self, segment: TimelineSegment) -> EngineResult<ActiveSegment> {
        debug!(
            conversation = %self.conversation,
            window = %segment.window,
            source = ?segment.source,
            "Starting segment"
        );
        match segment.source {
            SegmentSource::Cached => {
                if self.policy.repair {
                    self.deps
                        .committer
                        .repair(
                            &self.conversation,
                            &self.deps.store,
                            Some(segment.window),
                            &self.policy,
                        )
                        .await?;
                }
                Ok(ActiveSegment::Cached {
                    window: segment.window,
                    after: None,
                })
            }
            SegmentSource::Pending => Ok(ActiveSegment::Pending(Box::new(FetchSession::new(
                Arc::clone(&self.deps.remote),
                Arc::clone(&self.deps.clock),
                self.conversation.clone(),
                segment.window,
                self.direction,
                &self.deps.fetch,
            )))),
        }
    }
}
