//! Scripted remote source and clock for tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cache::core::errors::RemoteError;
use crate::cache::core::ids::{ConversationId, MessageId};
use crate::cache::core::message::{MediaCategory, MediaHandle, RawAttachment, RawMessage};
use crate::cache::core::window::{Direction, millis_to_datetime};
use crate::cache::remote::clock::{Clock, SleepFuture};
use crate::cache::remote::source::{FetchQuery, RemoteFuture, RemoteSource};

/// Plain text message at `millis`.
pub fn text_at(id: i64, millis: i64) -> RawMessage {
    RawMessage::text(id, millis_to_datetime(millis).unwrap(), format!("message {id}"))
}

/// Attachment descriptor with a handle derived from category and size.
pub fn attachment(category: MediaCategory, declared_size: u64) -> RawAttachment {
    RawAttachment {
        category,
        declared_size,
        handle: MediaHandle(format!("{category}-{declared_size}")),
        file_name: None,
        mime_type: None,
    }
}

#[derive(Default)]
struct RemoteState {
    history: Vec<RawMessage>,
    fetch_errors: VecDeque<RemoteError>,
    scheduled_errors: HashMap<usize, RemoteError>,
    download_errors: VecDeque<RemoteError>,
    fetch_calls: usize,
    download_calls: usize,
    queries: Vec<FetchQuery>,
}

/// In-memory remote history with scripted failures.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    ignore_window: bool,
}

impl FakeRemote {
    pub fn new(history: Vec<RawMessage>) -> Self {
        let remote = Self::default();
        remote.replace_history(history);
        remote
    }

    /// Return messages regardless of the query window, like a sloppy client.
    pub fn ignoring_window(mut self) -> Self {
        self.ignore_window = true;
        self
    }

    pub fn replace_history(&self, mut history: Vec<RawMessage>) {
        history.sort_by_key(|m| (m.timestamp_millis(), m.id));
        self.state.lock().unwrap().history = history;
    }

    pub fn push_fetch_error(&self, err: RemoteError) {
        self.state.lock().unwrap().fetch_errors.push_back(err);
    }

    /// Fail the `call`-th fetch (1-based) with `err`.
    pub fn schedule_fetch_error(&self, call: usize, err: RemoteError) {
        self.state.lock().unwrap().scheduled_errors.insert(call, err);
    }

    pub fn push_download_error(&self, err: RemoteError) {
        self.state.lock().unwrap().download_errors.push_back(err);
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().unwrap().fetch_calls
    }

    pub fn download_calls(&self) -> usize {
        self.state.lock().unwrap().download_calls
    }

    pub fn queries(&self) -> Vec<FetchQuery> {
        self.state.lock().unwrap().queries.clone()
    }
}

impl RemoteSource for FakeRemote {
    fn fetch_batch(&self, query: FetchQuery) -> RemoteFuture<'_, Result<Vec<RawMessage>, RemoteError>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.fetch_calls += 1;
            state.queries.push(query.clone());
            let call = state.fetch_calls;
            let scripted = match state.scheduled_errors.remove(&call) {
                Some(err) => Some(err),
                None => state.fetch_errors.pop_front(),
            };
            match scripted {
                Some(err) => Err(err),
                None => {
                    let mut page: Vec<RawMessage> = state
                        .history
                        .iter()
                        .filter(|m| {
                            self.ignore_window || query.window.contains_millis(m.timestamp_millis())
                        })
                        .filter(|m| {
                            query.after.is_none_or(|cursor| {
                                cursor.admits(m.timestamp_millis(), m.id, query.direction)
                            })
                        })
                        .cloned()
                        .collect();
                    if query.direction == Direction::Descending {
                        page.reverse();
                    }
                    page.truncate(query.limit);
                    Ok(page)
                }
            }
        };
        Box::pin(async move { result })
    }

    fn download_media<'a>(
        &'a self,
        _conversation: &'a ConversationId,
        handle: &'a MediaHandle,
        destination: &'a Path,
    ) -> RemoteFuture<'a, Result<u64, RemoteError>> {
        Box::pin(async move {
            let scripted = {
                let mut state = self.state.lock().unwrap();
                state.download_calls += 1;
                state.download_errors.pop_front()
            };
            if let Some(err) = scripted {
                return Err(err);
            }
            let bytes = format!("bytes of {}", handle.as_str()).into_bytes();
            tokio::fs::write(destination, &bytes)
                .await
                .map_err(|err| RemoteError::TransientNetwork(err.to_string()))?;
            Ok(bytes.len() as u64)
        })
    }
}

/// Clock that records requested sleeps and returns immediately.
#[derive(Default)]
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        self.sleeps.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

/// Clock whose sleeps never finish; counts sleeps started and abandoned.
#[derive(Default)]
pub struct StalledClock {
    started: AtomicUsize,
    abandoned: AtomicUsize,
}

impl StalledClock {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct AbandonGuard<'a>(&'a AtomicUsize);

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Clock for StalledClock {
    fn sleep(&self, _duration: Duration) -> SleepFuture<'_> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let _guard = AbandonGuard(&self.abandoned);
            std::future::pending::<()>().await;
        })
    }
}

/// Ids of a slice of messages, handy in assertions.
pub fn ids_of(ids: impl IntoIterator<Item = MessageId>) -> Vec<i64> {
    ids.into_iter().map(MessageId::get).collect()
}
