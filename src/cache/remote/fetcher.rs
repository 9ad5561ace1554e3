//! Paged remote fetch for one pending window.
//!
//! A [`FetchSession`] turns repeated [`RemoteSource::fetch_batch`] calls into a
//! lazy sequence of ordered batches. It is a small state machine:
//!
//! ```text
//! Fetching --page--> Fetching
//! Fetching --rate limited--> BackingOff(d) --sleep d--> Fetching
//! Fetching --empty page--> Exhausted
//! ```
//!
//! The session only reads. It never touches the store, so a paused or
//! abandoned session leaves nothing to clean up.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::core::config::FetchConfig;
use crate::cache::core::errors::{EngineError, EngineResult, RemoteError};
use crate::cache::core::ids::ConversationId;
use crate::cache::core::message::RawMessage;
use crate::cache::core::window::{Cursor, Direction, TimeWindow};
use crate::cache::remote::clock::Clock;
use crate::cache::remote::source::{FetchQuery, RemoteSource};

/// Where a fetch session stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchState {
    /// Ready to request the next page.
    Fetching,
    /// Waiting out a rate limit before retrying the same cursor.
    BackingOff(Duration),
    /// The remote reported nothing more for the window.
    Exhausted,
}

/// Lazy ordered fetch of one window.
pub struct FetchSession {
    remote: Arc<dyn RemoteSource>,
    clock: Arc<dyn Clock>,
    conversation: ConversationId,
    window: TimeWindow,
    direction: Direction,
    batch_size: usize,
    max_wait: Duration,
    max_retries: u32,
    cursor: Option<Cursor>,
    state: FetchState,
    retries: u32,
}

impl FetchSession {
    /// Start a session over `window`.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
        conversation: ConversationId,
        window: TimeWindow,
        direction: Direction,
        config: &FetchConfig,
    ) -> Self {
        Self {
            remote,
            clock,
            conversation,
            window,
            direction,
            batch_size: config.batch_size,
            max_wait: Duration::from_secs(config.max_retry_wait_seconds),
            max_retries: config.max_rate_limit_retries,
            cursor: None,
            state: FetchState::Fetching,
            retries: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> FetchState {
        self.state
    }

    /// Position of the last accepted message.
    #[must_use]
    pub const fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    /// Next ordered batch, or `None` once the window is exhausted.
    ///
    /// # Errors
    /// Returns the remote failure mapped onto [`EngineError`]. A rate limit
    /// longer than the configured maximum, or one that repeats too often,
    /// surfaces as a retryable [`EngineError::RateLimited`].
    pub async fn next_batch(&mut self) -> EngineResult<Option<Vec<RawMessage>>> {
        loop {
            match self.state {
                FetchState::Exhausted => return Ok(None),
                FetchState::BackingOff(delay) => {
                    self.clock.sleep(delay).await;
                    self.state = FetchState::Fetching;
                }
                FetchState::Fetching => {
                    let query = FetchQuery {
                        conversation: self.conversation.clone(),
                        window: self.window,
                        direction: self.direction,
                        after: self.cursor,
                        limit: self.batch_size,
                    };
                    match self.remote.fetch_batch(query).await {
                        Ok(page) => {
                            self.retries = 0;
                            return Ok(self.accept(page));
                        }
                        Err(RemoteError::RateLimited { retry_after }) => {
                            self.back_off(retry_after)?;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    fn back_off(&mut self, retry_after: Duration) -> EngineResult<()> {
        if retry_after > self.max_wait || self.retries >= self.max_retries {
            warn!(
                conversation = %self.conversation,
                retry_after_secs = retry_after.as_secs(),
                retries = self.retries,
                "Rate limit exceeds what the engine waits out"
            );
            return Err(EngineError::RateLimited { retry_after });
        }
        self.retries += 1;
        warn!(
            conversation = %self.conversation,
            retry_after_secs = retry_after.as_secs(),
            attempt = self.retries,
            "Rate limited, backing off"
        );
        self.state = FetchState::BackingOff(retry_after);
        Ok(())
    }

    /// Keep the in-window, strictly advancing prefix of the page order.
    fn accept(&mut self, page: Vec<RawMessage>) -> Option<Vec<RawMessage>> {
        if page.is_empty() {
            self.state = FetchState::Exhausted;
            return None;
        }

        let received = page.len();
        let mut accepted = Vec::with_capacity(received);
        for msg in page {
            let ts = msg.timestamp_millis();
            let in_window = self.window.contains_millis(ts);
            let advances = self
                .cursor
                .is_none_or(|cursor| cursor.admits(ts, msg.id, self.direction));
            if in_window && advances {
                self.cursor = Some(Cursor {
                    timestamp_millis: ts,
                    message_id: msg.id,
                });
                accepted.push(msg);
            }
        }

        let dropped = received - accepted.len();
        if dropped > 0 {
            warn!(
                conversation = %self.conversation,
                dropped,
                "Dropped remote messages outside the window or out of order"
            );
        }

        if accepted.is_empty() {
            // The cursor cannot advance on such a page; asking again would loop.
            self.state = FetchState::Exhausted;
            return None;
        }

        debug!(
            conversation = %self.conversation,
            count = accepted.len(),
            "Fetched remote batch"
        );
        Some(accepted)
    }
}
