//! Re-chunks the ordered record stream to the caller's delivery size.
//!
//! Fetch granularity and delivery granularity are independent. A producer
//! task drives the runner and pushes full delivery batches into a channel
//! with room for one batch, so the engine never works more than one batch
//! ahead of the consumer. Closing the receiver interrupts a pending remote
//! fetch or rate-limit pause; a commit already running is left to finish.

use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::cache::core::errors::EngineResult;
use crate::cache::core::message::MessageRecord;
use crate::cache::timeline::runner::TimelineRunner;

/// One batch handed to the caller.
pub type DeliveryBatch = Vec<MessageRecord>;

/// Requested delivery granularity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChunkSize {
    /// Batches of exactly `k` rows; the last one may be shorter.
    Rows(NonZeroUsize),
    /// A single batch holding the whole window.
    #[default]
    Whole,
}

impl ChunkSize {
    /// Map a raw row count, with `0` meaning [`ChunkSize::Whole`].
    #[must_use]
    pub fn from_rows(rows: usize) -> Self {
        NonZeroUsize::new(rows).map_or(Self::Whole, Self::Rows)
    }
}

/// Accumulates rows and releases them in delivery-sized batches.
#[derive(Debug)]
pub struct DeliveryBuffer {
    chunk: ChunkSize,
    pending: Vec<MessageRecord>,
}

impl DeliveryBuffer {
    /// Empty buffer for `chunk`.
    #[must_use]
    pub const fn new(chunk: ChunkSize) -> Self {
        Self {
            chunk,
            pending: Vec::new(),
        }
    }

    /// Add rows and take every batch that is now full.
    #[must_use]
    pub fn push(&mut self, rows: Vec<MessageRecord>) -> Vec<DeliveryBatch> {
        self.pending.extend(rows);
        let ChunkSize::Rows(size) = self.chunk else {
            return Vec::new();
        };
        let size = size.get();
        let mut ready = Vec::new();
        while self.pending.len() >= size {
            let rest = self.pending.split_off(size);
            ready.push(std::mem::replace(&mut self.pending, rest));
        }
        ready
    }

    /// Flush at end of stream. `Whole` always yields one batch, even when empty.
    #[must_use]
    pub fn finish(self) -> Option<DeliveryBatch> {
        match self.chunk {
            ChunkSize::Whole => Some(self.pending),
            ChunkSize::Rows(_) => (!self.pending.is_empty()).then_some(self.pending),
        }
    }
}

/// Ordered delivery batches of one stream request.
///
/// Dropping the stream cancels the request: the producer stops before its
/// next send, and abandons a remote fetch or backoff it is waiting on. A
/// commit already in progress still completes.
pub struct MessageStream {
    inner: ReceiverStream<EngineResult<DeliveryBatch>>,
}

impl MessageStream {
    /// Start producing batches from `runner` on a background task.
    #[must_use]
    pub fn spawn(runner: TimelineRunner, chunk: ChunkSize) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(produce(runner, chunk, tx));
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Receive the next batch; `None` once the stream is finished.
    pub async fn next_batch(&mut self) -> Option<EngineResult<DeliveryBatch>> {
        self.inner.next().await
    }

    /// Drain every remaining batch into one ordered list.
    ///
    /// # Errors
    /// Returns the first error the stream yields.
    pub async fn collect_records(mut self) -> EngineResult<Vec<MessageRecord>> {
        let mut records = Vec::new();
        while let Some(batch) = self.next_batch().await {
            records.extend(batch?);
        }
        Ok(records)
    }
}

impl Stream for MessageStream {
    type Item = EngineResult<DeliveryBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn produce(
    mut runner: TimelineRunner,
    chunk: ChunkSize,
    tx: mpsc::Sender<EngineResult<DeliveryBatch>>,
) {
    let mut buffer = DeliveryBuffer::new(chunk);
    loop {
        if tx.is_closed() {
            debug!("Stream receiver dropped, stopping");
            return;
        }
        match runner.next_rows(tx.closed()).await {
            Ok(Some(rows)) => {
                for batch in buffer.push(rows) {
                    if tx.send(Ok(batch)).await.is_err() {
                        debug!("Stream receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Stream failed");
                // Rows that did not fill a batch yet are dropped with the buffer.
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }

    if tx.is_closed() {
        debug!("Stream receiver dropped, stopping");
        return;
    }
    if let Some(batch) = buffer.finish() {
        let _ = tx.send(Ok(batch)).await;
    }
}
