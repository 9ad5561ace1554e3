//! End-to-end behavior of the engine against a scripted remote.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::cache::core::config::{EngineConfig, MediaPolicy};
use crate::cache::core::errors::{EngineError, RemoteError};
use crate::cache::core::ids::{ConversationId, MediaId};
use crate::cache::core::message::{MediaCategory, MessageRecord, RawMessage, SenderInfo};
use crate::cache::core::window::{Direction, TimeWindow};
use crate::cache::engine::core::{CacheEngine, StreamRequest};
use crate::cache::remote::clock::Clock;
use crate::cache::remote::source::RemoteSource;
use crate::cache::testing::{FakeRemote, ManualClock, StalledClock, attachment, ids_of};
use crate::cache::timeline::multiplexer::{ChunkSize, DeliveryBatch};

const MESSAGES: i64 = 124;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeWindow {
    TimeWindow::new(start, end).unwrap()
}

fn january() -> TimeWindow {
    window(at(1, 0), at(31, 0) + TimeDelta::days(1) - TimeDelta::milliseconds(1))
}

/// Four messages a day through January 2024, ids 1..=124.
fn history() -> Vec<RawMessage> {
    (0..MESSAGES)
        .map(|i| {
            let id = i + 1;
            let msg = RawMessage::text(id, at(1, 0) + TimeDelta::hours(6 * i), format!("message {id}"));
            if id % 5 == 0 {
                msg.with_sender(SenderInfo {
                    id: 77,
                    first_name: Some("Ada".to_string()),
                    last_name: None,
                    username: Some("ada".to_string()),
                })
            } else {
                msg
            }
        })
        .collect()
}

struct Harness {
    _dir: tempfile::TempDir,
    engine: CacheEngine,
    remote: Arc<FakeRemote>,
    clock: Arc<ManualClock>,
    conversation: ConversationId,
}

impl Harness {
    fn new(history: Vec<RawMessage>, batch_size: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.storage.cache_page_size = 16;
        config.fetch.batch_size = batch_size;

        let remote = Arc::new(FakeRemote::new(history));
        let clock = Arc::new(ManualClock::default());
        let engine = CacheEngine::with_clock(
            config,
            Arc::clone(&remote) as Arc<dyn RemoteSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();

        Self {
            _dir: dir,
            engine,
            remote,
            clock,
            conversation: ConversationId::from(-1_001_234_i64),
        }
    }

    fn request(&self, window: TimeWindow) -> StreamRequest {
        StreamRequest::new(self.conversation.clone(), window)
    }

    async fn batches(&self, request: StreamRequest) -> Vec<DeliveryBatch> {
        let mut stream = self.engine.stream(request).await.unwrap();
        let mut out = Vec::new();
        while let Some(batch) = stream.next_batch().await {
            out.push(batch.unwrap());
        }
        out
    }

    async fn records(&self, request: StreamRequest) -> Vec<MessageRecord> {
        self.batches(request).await.into_iter().flatten().collect()
    }
}

fn sizes(batches: &[DeliveryBatch]) -> Vec<usize> {
    batches.iter().map(Vec::len).collect()
}

fn record_ids(records: &[MessageRecord]) -> Vec<i64> {
    ids_of(records.iter().map(|r| r.message_id))
}

#[tokio::test]
async fn empty_conversation_fetches_whole_window() {
    let h = Harness::new(history(), 50);
    let batches = h
        .batches(h.request(january()).chunk(ChunkSize::from_rows(100)))
        .await;

    assert_eq!(sizes(&batches), vec![100, 24]);
    assert!(h.remote.fetch_calls() >= 1);

    let coverage = h.engine.coverage(&h.conversation).await.unwrap().unwrap();
    assert_eq!(coverage.min, at(1, 0));
    assert_eq!(coverage.max, at(31, 18));
    assert_eq!(coverage.row_count, 124);
}

#[tokio::test]
async fn covered_window_is_served_without_remote_calls() {
    let h = Harness::new(history(), 50);
    h.records(h.request(january())).await;
    let calls = h.remote.fetch_calls();

    let records = h
        .records(h.request(window(at(5, 0), at(10, 0))).chunk(ChunkSize::from_rows(4)))
        .await;
    assert_eq!(h.remote.fetch_calls(), calls);
    assert_eq!(record_ids(&records), (17..=37).collect::<Vec<_>>());
    assert_eq!(records[3].sender.first_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn bracketing_request_fetches_only_the_gaps() {
    let h = Harness::new(history(), 20);
    h.records(h.request(window(at(10, 0), at(20, 0)))).await;
    let primed = h.remote.queries().len();

    let records = h.records(h.request(january())).await;
    assert_eq!(record_ids(&records), (1..=MESSAGES).collect::<Vec<_>>());

    let fetched: Vec<TimeWindow> = h.remote.queries()[primed..]
        .iter()
        .filter(|q| q.after.is_none())
        .map(|q| q.window)
        .collect();
    let one = TimeDelta::milliseconds(1);
    assert_eq!(
        fetched,
        vec![
            window(at(1, 0), at(10, 0) - one),
            window(at(20, 0) + one, january().end),
        ]
    );
    for query in &h.remote.queries()[primed..] {
        assert!(query.window.end < at(10, 0) || query.window.start > at(20, 0));
    }
}

#[tokio::test]
async fn descending_merge_is_strictly_ordered() {
    let h = Harness::new(history(), 7);
    h.records(h.request(window(at(10, 0), at(20, 0)))).await;

    let records = h
        .records(
            h.request(january())
                .direction(Direction::Descending)
                .chunk(ChunkSize::from_rows(9)),
        )
        .await;
    assert_eq!(records.len(), 124);
    for pair in records.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp);
    }
    assert_eq!(records[0].message_id.get(), MESSAGES);
}

#[tokio::test]
async fn failed_batch_leaves_coverage_unchanged() {
    let h = Harness::new(history(), 10);
    h.records(h.request(window(at(10, 0), at(20, 0)))).await;
    let before = h.engine.coverage(&h.conversation).await.unwrap();

    let db_file = h
        .engine
        .config()
        .storage
        .data_dir
        .join("channels")
        .join(h.conversation.as_str())
        .join(format!("{}.db", h.conversation));
    {
        // Message 5 sits in the middle of the first batch of the older gap.
        let conn = rusqlite::Connection::open(db_file).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_five BEFORE INSERT ON messages
             WHEN NEW.message_id = 5
             BEGIN SELECT RAISE(ABORT, 'injected'); END;",
        )
        .unwrap();
    }

    let mut stream = h
        .engine
        .stream(h.request(january()).chunk(ChunkSize::from_rows(10)))
        .await
        .unwrap();
    let mut failed = false;
    while let Some(batch) = stream.next_batch().await {
        if batch.is_err() {
            failed = true;
        }
    }
    assert!(failed);
    assert_eq!(h.engine.coverage(&h.conversation).await.unwrap(), before);
}

#[tokio::test]
async fn repeated_request_is_identical() {
    let h = Harness::new(history(), 13);
    // Ends on the newest message so the second run is fully cached.
    let request = h
        .request(window(at(1, 0), at(31, 18)))
        .chunk(ChunkSize::from_rows(7));

    let first = h.batches(request.clone()).await;
    let calls = h.remote.fetch_calls();
    let second = h.batches(request).await;

    assert_eq!(h.remote.fetch_calls(), calls);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn delivery_batches_depend_only_on_chunk_size() {
    let mut expected = vec![7; 17];
    expected.push(5);

    for fetch_batch in [1, 3, 10, 50, 500] {
        let h = Harness::new(history(), fetch_batch);
        let batches = h
            .batches(h.request(january()).chunk(ChunkSize::from_rows(7)))
            .await;
        assert_eq!(sizes(&batches), expected, "fetch batch size {fetch_batch}");
    }

    let h = Harness::new(history(), 9);
    let whole = h.batches(h.request(january())).await;
    assert_eq!(sizes(&whole), vec![124]);
}

#[tokio::test]
async fn whole_chunk_on_empty_window_yields_one_empty_batch() {
    let h = Harness::new(Vec::new(), 10);
    let batches = h.batches(h.request(january())).await;
    assert_eq!(sizes(&batches), vec![0]);
}

#[tokio::test]
async fn oversized_media_is_skipped_then_repaired() {
    let big = 30 * 1024 * 1024;
    let mut messages = history();
    messages[40] = messages[40]
        .clone()
        .with_attachment(attachment(MediaCategory::Video, big));
    let h = Harness::new(messages, 25);

    let first = h.records(h.request(january())).await;
    let before = first[40].clone();
    assert_eq!(before.media_category, Some(MediaCategory::Video));
    assert!(before.media.is_none());
    assert_eq!(h.remote.download_calls(), 0);

    let policy = MediaPolicy {
        max_media_size_bytes: Some(64 * 1024 * 1024),
        repair: true,
        ..MediaPolicy::default()
    };
    let report = h
        .engine
        .repair_media(&h.conversation, None, policy)
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.downloaded, 1);

    let after = h.records(h.request(january())).await;
    let media = after[40].media.clone().unwrap();
    let mut unchanged = after[40].clone();
    unchanged.media = None;
    assert_eq!(unchanged, before);

    let location = h.engine.resolve_media(media.id).await.unwrap().unwrap();
    assert!(location.path.exists());
    assert_eq!(location.size, media.size);
    assert!(h.engine.resolve_media(MediaId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn rate_limit_pauses_and_resumes_same_cursor() {
    let calm = Harness::new(history(), 10);
    let expected = calm.records(calm.request(january())).await;

    let h = Harness::new(history(), 10);
    h.remote.schedule_fetch_error(
        2,
        RemoteError::RateLimited {
            retry_after: Duration::from_secs(5),
        },
    );
    let records = h.records(h.request(january())).await;

    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5)]);
    let queries = h.remote.queries();
    assert_eq!(queries[1].after, queries[2].after);
    assert_eq!(
        serde_json::to_string(&records).unwrap(),
        serde_json::to_string(&expected).unwrap()
    );
}

#[tokio::test]
async fn not_authorized_ends_the_stream() {
    let h = Harness::new(history(), 10);
    h.remote.push_fetch_error(RemoteError::NotAuthorized);

    let mut stream = h.engine.stream(h.request(january())).await.unwrap();
    let err = stream.next_batch().await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
    assert!(stream.next_batch().await.is_none());
    assert!(h.engine.coverage(&h.conversation).await.unwrap().is_none());
}

#[tokio::test]
async fn force_refresh_applies_remote_edits() {
    let h = Harness::new(history(), 50);
    h.records(h.request(january())).await;

    let mut edited = history();
    edited[2].content = "edited".to_string();
    edited[2].edit_timestamp = Some(at(20, 0));
    h.remote.replace_history(edited);

    let cached = h.records(h.request(january())).await;
    assert_eq!(cached[2].content, "message 3");

    let refreshed = h
        .records(h.request(january()).force_refresh(true))
        .await;
    assert_eq!(refreshed[2].content, "edited");
    assert_eq!(refreshed[2].edit_timestamp, Some(at(20, 0)));
    let coverage = h.engine.coverage(&h.conversation).await.unwrap().unwrap();
    assert_eq!(coverage.row_count, 124);
}

#[tokio::test]
async fn dropping_the_stream_stops_fetching() {
    let h = Harness::new(history(), 10);
    let mut stream = h
        .engine
        .stream(h.request(january()).chunk(ChunkSize::from_rows(1)))
        .await
        .unwrap();
    let first = stream.next_batch().await.unwrap().unwrap();
    assert_eq!(record_ids(&first), vec![1]);
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.fetch_calls(), 1);
    let coverage = h.engine.coverage(&h.conversation).await.unwrap().unwrap();
    assert_eq!(coverage.row_count, 10);
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn dropping_the_stream_interrupts_rate_limit_pause() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.fetch.batch_size = 10;
    let remote = Arc::new(FakeRemote::new(history()));
    remote.push_fetch_error(RemoteError::RateLimited {
        retry_after: Duration::from_secs(60),
    });
    let clock = Arc::new(StalledClock::default());
    let engine = CacheEngine::with_clock(
        config,
        Arc::clone(&remote) as Arc<dyn RemoteSource>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .unwrap();
    let conversation = ConversationId::from(-1_001_234_i64);

    let stream = engine
        .stream(StreamRequest::new(conversation.clone(), january()))
        .await
        .unwrap();
    wait_until(|| clock.started() == 1).await;
    drop(stream);

    wait_until(|| clock.abandoned() == 1).await;
    assert_eq!(remote.fetch_calls(), 1);
    assert!(engine.coverage(&conversation).await.unwrap().is_none());
}

#[tokio::test]
async fn coverage_of_unknown_conversation_is_none() {
    let h = Harness::new(history(), 10);
    let stranger = ConversationId::new("stranger").unwrap();
    assert!(h.engine.coverage(&stranger).await.unwrap().is_none());
    assert!(
        !h.engine
            .config()
            .storage
            .data_dir
            .join("channels")
            .join("stranger")
            .exists()
    );
}

#[tokio::test]
async fn large_fetch_page_reads_back_every_row() {
    let history: Vec<RawMessage> = (1..=1_200)
        .map(|id| RawMessage::text(id, at(2, 0) + TimeDelta::minutes(id), format!("message {id}")))
        .collect();
    let h = Harness::new(history, 5_000);

    let records = h.records(h.request(january())).await;
    assert_eq!(record_ids(&records), (1..=1_200).collect::<Vec<_>>());
    assert_eq!(h.engine.coverage(&h.conversation).await.unwrap().unwrap().row_count, 1_200);
}

#[tokio::test]
async fn concurrent_streams_agree_and_store_each_message_once() {
    let h = Harness::new(history(), 20);
    let first = h.request(january()).chunk(ChunkSize::from_rows(7));
    let second = h
        .request(january())
        .direction(Direction::Descending)
        .chunk(ChunkSize::from_rows(11));

    let (ascending, mut descending) = tokio::join!(h.records(first), h.records(second));
    descending.reverse();

    assert_eq!(record_ids(&ascending), (1..=MESSAGES).collect::<Vec<_>>());
    assert_eq!(record_ids(&descending), record_ids(&ascending));
    assert_eq!(ascending, descending);
    let coverage = h.engine.coverage(&h.conversation).await.unwrap().unwrap();
    assert_eq!(coverage.row_count, u64::try_from(MESSAGES).unwrap());
}
