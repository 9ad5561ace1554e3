//! Boundary to the remote messaging client.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::cache::core::errors::RemoteError;
use crate::cache::core::ids::ConversationId;
use crate::cache::core::message::{MediaHandle, RawMessage};
use crate::cache::core::window::{Cursor, Direction, TimeWindow};

/// Boxed future type for remote calls.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One page request against the remote history.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchQuery {
    /// Conversation to read.
    pub conversation: ConversationId,
    /// Inclusive window the page must stay within.
    pub window: TimeWindow,
    /// Order of the returned page.
    pub direction: Direction,
    /// Resume position; results must be strictly beyond it.
    pub after: Option<Cursor>,
    /// Maximum number of messages to return.
    pub limit: usize,
}

/// Remote message source.
///
/// Implementations wrap the protocol client. The engine only needs ordered
/// history pages and attachment downloads; sessions, authentication and
/// dialog lookup stay on the other side of this trait.
pub trait RemoteSource: Send + Sync {
    /// Fetch the next page of history. An empty page means the window is exhausted.
    fn fetch_batch(&self, query: FetchQuery) -> RemoteFuture<'_, Result<Vec<RawMessage>, RemoteError>>;

    /// Download an attachment to `destination`, returning the bytes written.
    fn download_media<'a>(
        &'a self,
        conversation: &'a ConversationId,
        handle: &'a MediaHandle,
        destination: &'a Path,
    ) -> RemoteFuture<'a, Result<u64, RemoteError>>;
}
