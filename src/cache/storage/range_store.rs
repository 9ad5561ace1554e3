//! Range store: the per-conversation message cache.
//!
//! Each conversation owns one `SQLite` file with three tables (`messages`,
//! `users`, `media_files`). There is no interval table: the covered range is
//! derived from the oldest and newest stored timestamps.
//!
//! The store keeps two connections in WAL mode. The writer is used only by the
//! batch committer and the media repair pass; the reader serves cached pages
//! and read-after-write lookups, and never waits on an open write transaction.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::cache::core::errors::{EngineError, EngineResult};
use crate::cache::core::ids::{MediaId, MessageId};
use crate::cache::core::message::{
    Linkage, MediaCategory, MediaHandle, MediaLocation, MediaRef, MessageRecord, RawAttachment,
    RawMessage, SenderInfo,
};
use crate::cache::core::window::{Cursor, Direction, RangeSummary, TimeWindow, millis_to_datetime};
use crate::cache::storage::paths::ConversationPaths;

/// Ids bound per `IN (...)` lookup, well under the `SQLite` variable limit.
const ID_CHUNK: usize = 500;

/// Boxed future type for range store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        first_name TEXT,
        last_name TEXT,
        username TEXT
    );
    CREATE TABLE IF NOT EXISTS messages (
        message_id INTEGER PRIMARY KEY,
        ts INTEGER NOT NULL,
        edit_ts INTEGER,
        sender_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        reply_to INTEGER,
        post_author TEXT,
        is_forwarded INTEGER NOT NULL DEFAULT 0,
        forwarded_from INTEGER,
        media_category TEXT,
        media_size INTEGER,
        media_handle TEXT,
        media_filename TEXT,
        media_mime TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages (ts, message_id);
    CREATE TABLE IF NOT EXISTS media_files (
        uuid TEXT PRIMARY KEY,
        message_id INTEGER NOT NULL UNIQUE REFERENCES messages (message_id),
        file_path TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        mime_type TEXT,
        original_filename TEXT,
        created_at INTEGER NOT NULL
    );";

const RECORD_COLUMNS: &str = "
    m.message_id, m.ts, m.edit_ts, m.sender_id,
    u.first_name, u.last_name, u.username,
    m.content, m.reply_to, m.post_author, m.is_forwarded, m.forwarded_from,
    m.media_category, f.uuid, f.original_filename, f.file_size";

const RECORD_SOURCE: &str = "
    FROM messages m
    LEFT JOIN users u ON u.user_id = m.sender_id
    LEFT JOIN media_files f ON f.message_id = m.message_id";

/// Read side of the message cache.
pub trait MessageStore: Send + Sync {
    /// Covered interval and row count; `None` when nothing is cached.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn summary(&self) -> StoreFuture<'_, EngineResult<Option<RangeSummary>>>;
    /// Read up to `limit` records of `window`, strictly after `after`, in `direction`.
    ///
    /// # Errors
    /// Returns an error if storage access fails or a row cannot be decoded.
    fn read_page(
        &self,
        window: TimeWindow,
        direction: Direction,
        after: Option<Cursor>,
        limit: usize,
    ) -> StoreFuture<'_, EngineResult<Vec<MessageRecord>>>;
    /// Read the given messages back, ordered by `direction`.
    ///
    /// # Errors
    /// Returns an error if storage access fails or a row cannot be decoded.
    fn read_by_ids(
        &self,
        ids: Vec<MessageId>,
        direction: Direction,
    ) -> StoreFuture<'_, EngineResult<Vec<MessageRecord>>>;
    /// Look up a downloaded attachment.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_media(&self, id: MediaId) -> StoreFuture<'_, EngineResult<Option<MediaLocation>>>;
}

/// Metadata row for a freshly downloaded attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMediaRow {
    /// Generated handle.
    pub id: MediaId,
    /// Owning message.
    pub message_id: MessageId,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
    /// MIME hint.
    pub mime_type: Option<String>,
    /// Original file name when known.
    pub original_filename: Option<String>,
    /// Creation time in Unix milliseconds.
    pub created_at_millis: i64,
}

/// A cached message whose attachment has no media row yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingMedia {
    /// Owning message.
    pub message_id: MessageId,
    /// Stored attachment descriptor.
    pub attachment: RawAttachment,
}

/// `SQLite` implementation of the range store.
pub struct SqliteRangeStore {
    writer: Connection,
    reader: Connection,
    paths: ConversationPaths,
}

impl SqliteRangeStore {
    /// Open (creating if needed) the partition at `paths`.
    ///
    /// # Errors
    /// Returns an error if the directories or database cannot be created.
    pub async fn open(paths: ConversationPaths) -> EngineResult<Self> {
        paths.ensure().await?;

        let writer = Connection::open(&paths.db_file).await?;
        writer
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA busy_timeout = 5000;
                     PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;",
                )?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        let reader = Connection::open(&paths.db_file).await?;
        reader
            .call(|conn| {
                conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA query_only = ON;")?;
                Ok(())
            })
            .await?;

        debug!(db = %paths.db_file.display(), "Opened conversation store");

        Ok(Self {
            writer,
            reader,
            paths,
        })
    }

    /// Partition paths of this store.
    #[must_use]
    pub const fn paths(&self) -> &ConversationPaths {
        &self.paths
    }

    /// Stored media file paths for the given messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn existing_media(
        &self,
        ids: Vec<MessageId>,
    ) -> EngineResult<HashMap<MessageId, PathBuf>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .reader
            .call(move |conn| {
                let mut rows = Vec::with_capacity(ids.len());
                for chunk in ids.chunks(ID_CHUNK) {
                    let sql = format!(
                        "SELECT message_id, file_path FROM media_files WHERE message_id IN ({})",
                        placeholders(chunk.len())
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let found = stmt.query_map(
                        rusqlite::params_from_iter(chunk.iter().map(|id| id.0)),
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                    )?;
                    for row in found {
                        rows.push(row?);
                    }
                }
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, path)| (MessageId(id), PathBuf::from(path)))
            .collect())
    }

    /// Cached messages that carry an attachment but have no media row.
    ///
    /// # Errors
    /// Returns an error if storage access fails or a descriptor cannot be decoded.
    pub async fn pending_media(&self, window: Option<TimeWindow>) -> EngineResult<Vec<PendingMedia>> {
        let (from, to) = window.map_or((i64::MIN, i64::MAX), |w| {
            (w.start_millis(), w.end_millis())
        });
        let rows = self
            .reader
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT m.message_id, m.media_category, m.media_size, m.media_handle,
                            m.media_filename, m.media_mime
                     FROM messages m
                     LEFT JOIN media_files f ON f.message_id = m.message_id
                     WHERE m.media_handle IS NOT NULL AND f.uuid IS NULL
                       AND m.ts BETWEEN ?1 AND ?2
                     ORDER BY m.ts, m.message_id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![from, to], |row| {
                        let message_id: i64 = row.get(0)?;
                        let category: Option<String> = row.get(1)?;
                        let size: Option<i64> = row.get(2)?;
                        let handle: String = row.get(3)?;
                        let file_name: Option<String> = row.get(4)?;
                        let mime: Option<String> = row.get(5)?;
                        Ok((message_id, category, size, handle, file_name, mime))
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for (message_id, category, size, handle, file_name, mime_type) in rows {
            let category = category
                .as_deref()
                .map(MediaCategory::from_str)
                .transpose()
                .map_err(|err| corrupted(format!("invalid media category: {err}")))?
                .ok_or_else(|| corrupted(format!("message {message_id} has a handle but no category")))?;
            let declared_size = u64::try_from(size.unwrap_or(0))
                .map_err(|_| corrupted(format!("negative media size on message {message_id}")))?;
            pending.push(PendingMedia {
                message_id: MessageId(message_id),
                attachment: RawAttachment {
                    category,
                    declared_size,
                    handle: MediaHandle(handle),
                    file_name,
                    mime_type,
                },
            });
        }
        Ok(pending)
    }

    /// Upsert one batch of messages, their senders and media rows in a single
    /// transaction. Nothing from the batch is visible unless everything commits.
    ///
    /// With `replace_media`, an existing media row for the same message gets the
    /// new path and size but keeps its original `MediaId`.
    pub(crate) async fn commit_batch(
        &self,
        messages: Vec<RawMessage>,
        media: Vec<NewMediaRow>,
        replace_media: bool,
    ) -> EngineResult<()> {
        if messages.is_empty() && media.is_empty() {
            return Ok(());
        }

        let messages = messages
            .into_iter()
            .map(MessageParams::try_from)
            .collect::<EngineResult<Vec<_>>>()?;
        let media = media
            .into_iter()
            .map(MediaParams::try_from)
            .collect::<EngineResult<Vec<_>>>()?;

        self.writer
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                {
                    let mut upsert_user = tx.prepare(
                        "INSERT INTO users (user_id, first_name, last_name, username)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(user_id) DO UPDATE SET
                            first_name = excluded.first_name,
                            last_name = excluded.last_name,
                            username = excluded.username",
                    )?;
                    let mut upsert_message = tx.prepare(
                        "INSERT INTO messages
                         (message_id, ts, edit_ts, sender_id, content, reply_to, post_author,
                          is_forwarded, forwarded_from, media_category, media_size, media_handle,
                          media_filename, media_mime)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                         ON CONFLICT(message_id) DO UPDATE SET
                            edit_ts = COALESCE(excluded.edit_ts, messages.edit_ts),
                            content = CASE WHEN excluded.edit_ts IS NOT NULL
                                           THEN excluded.content ELSE messages.content END,
                            media_category = COALESCE(messages.media_category, excluded.media_category),
                            media_size = COALESCE(messages.media_size, excluded.media_size),
                            media_handle = COALESCE(excluded.media_handle, messages.media_handle),
                            media_filename = COALESCE(messages.media_filename, excluded.media_filename),
                            media_mime = COALESCE(messages.media_mime, excluded.media_mime)",
                    )?;

                    for msg in &messages {
                        upsert_user.execute(rusqlite::params![
                            msg.sender_id,
                            msg.first_name,
                            msg.last_name,
                            msg.username
                        ])?;
                        upsert_message.execute(rusqlite::params![
                            msg.message_id,
                            msg.ts,
                            msg.edit_ts,
                            msg.sender_id,
                            msg.content,
                            msg.reply_to,
                            msg.post_author,
                            msg.is_forwarded,
                            msg.forwarded_from,
                            msg.media_category,
                            msg.media_size,
                            msg.media_handle,
                            msg.media_filename,
                            msg.media_mime
                        ])?;
                    }

                    insert_media_rows(&tx, &media, replace_media)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert media rows for already cached messages, leaving message rows untouched.
    /// Rows for messages that gained media in the meantime are ignored.
    pub(crate) async fn insert_media(&self, media: Vec<NewMediaRow>) -> EngineResult<usize> {
        if media.is_empty() {
            return Ok(0);
        }
        let media = media
            .into_iter()
            .map(MediaParams::try_from)
            .collect::<EngineResult<Vec<_>>>()?;

        let inserted = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let inserted = insert_media_rows(&tx, &media, false)?;
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    async fn query_records(
        &self,
        sql: String,
        params: Vec<rusqlite::types::Value>,
    ) -> EngineResult<Vec<MessageRecord>> {
        let rows = self
            .reader
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), StoredRow::from_row)?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

impl MessageStore for SqliteRangeStore {
    fn summary(&self) -> StoreFuture<'_, EngineResult<Option<RangeSummary>>> {
        Box::pin(async move {
            let (min, max, count) = self
                .reader
                .call(|conn| {
                    let row = conn.query_row(
                        "SELECT MIN(ts), MAX(ts), COUNT(*) FROM messages",
                        [],
                        |row| {
                            Ok((
                                row.get::<_, Option<i64>>(0)?,
                                row.get::<_, Option<i64>>(1)?,
                                row.get::<_, i64>(2)?,
                            ))
                        },
                    )?;
                    Ok(row)
                })
                .await?;

            let (Some(min), Some(max)) = (min, max) else {
                return Ok(None);
            };
            let row_count =
                u64::try_from(count).map_err(|_| corrupted("negative row count".to_string()))?;
            Ok(Some(RangeSummary {
                min: stored_timestamp(min)?,
                max: stored_timestamp(max)?,
                row_count,
            }))
        })
    }

    fn read_page(
        &self,
        window: TimeWindow,
        direction: Direction,
        after: Option<Cursor>,
        limit: usize,
    ) -> StoreFuture<'_, EngineResult<Vec<MessageRecord>>> {
        Box::pin(async move {
            let limit = i64::try_from(limit)
                .map_err(|_| EngineError::InvalidRequest("page size exceeds i64".to_string()))?;
            let order = direction.sql_order();
            let sql = format!(
                "SELECT {RECORD_COLUMNS} {RECORD_SOURCE}
                 WHERE m.ts BETWEEN ?1 AND ?2
                   AND (?3 IS NULL OR (m.ts, m.message_id) {cmp} (?3, ?4))
                 ORDER BY m.ts {order}, m.message_id {order}
                 LIMIT ?5",
                cmp = direction.sql_after(),
            );
            let (cursor_ts, cursor_id) = match after {
                Some(cursor) => (
                    rusqlite::types::Value::Integer(cursor.timestamp_millis),
                    rusqlite::types::Value::Integer(cursor.message_id.0),
                ),
                None => (rusqlite::types::Value::Null, rusqlite::types::Value::Null),
            };
            let params = vec![
                rusqlite::types::Value::Integer(window.start_millis()),
                rusqlite::types::Value::Integer(window.end_millis()),
                cursor_ts,
                cursor_id,
                rusqlite::types::Value::Integer(limit),
            ];
            self.query_records(sql, params).await
        })
    }

    fn read_by_ids(
        &self,
        ids: Vec<MessageId>,
        direction: Direction,
    ) -> StoreFuture<'_, EngineResult<Vec<MessageRecord>>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut records = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(ID_CHUNK) {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} {RECORD_SOURCE} WHERE m.message_id IN ({})",
                    placeholders(chunk.len()),
                );
                let params = chunk
                    .iter()
                    .map(|id| rusqlite::types::Value::Integer(id.0))
                    .collect();
                records.extend(self.query_records(sql, params).await?);
            }
            records.sort_by_key(|r| (r.timestamp, r.message_id));
            if direction == Direction::Descending {
                records.reverse();
            }
            Ok(records)
        })
    }

    fn find_media(&self, id: MediaId) -> StoreFuture<'_, EngineResult<Option<MediaLocation>>> {
        Box::pin(async move {
            let key = id.to_string();
            let row = self
                .reader
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT file_path, original_filename, file_size, mime_type
                             FROM media_files WHERE uuid = ?1",
                            rusqlite::params![key],
                            |row| {
                                Ok((
                                    row.get::<_, String>(0)?,
                                    row.get::<_, Option<String>>(1)?,
                                    row.get::<_, i64>(2)?,
                                    row.get::<_, Option<String>>(3)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(|(path, original_filename, size, mime_type)| {
                let size = u64::try_from(size)
                    .map_err(|_| corrupted(format!("negative size for media {id}")))?;
                Ok(MediaLocation {
                    id,
                    path: PathBuf::from(path),
                    original_filename,
                    size,
                    mime_type,
                })
            })
            .transpose()
        })
    }
}

fn insert_media_rows(
    tx: &rusqlite::Transaction<'_>,
    media: &[MediaParams],
    replace: bool,
) -> Result<usize, rusqlite::Error> {
    if media.is_empty() {
        return Ok(0);
    }
    let on_conflict = if replace {
        "ON CONFLICT(message_id) DO UPDATE SET
            file_path = excluded.file_path,
            file_size = excluded.file_size,
            mime_type = excluded.mime_type,
            original_filename = excluded.original_filename"
    } else {
        "ON CONFLICT(message_id) DO NOTHING"
    };
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO media_files
         (uuid, message_id, file_path, file_size, mime_type, original_filename, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         {on_conflict}"
    ))?;
    let mut written = 0;
    for row in media {
        written += stmt.execute(rusqlite::params![
            row.uuid,
            row.message_id,
            row.file_path,
            row.file_size,
            row.mime_type,
            row.original_filename,
            row.created_at
        ])?;
    }
    Ok(written)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn corrupted(detail: String) -> EngineError {
    EngineError::CacheCorrupted(detail)
}

fn stored_timestamp(ts: i64) -> EngineResult<chrono::DateTime<chrono::Utc>> {
    millis_to_datetime(ts).map_err(|_| corrupted(format!("invalid stored timestamp {ts}")))
}

/// Column values for one message upsert.
struct MessageParams {
    message_id: i64,
    ts: i64,
    edit_ts: Option<i64>,
    sender_id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    content: String,
    reply_to: Option<i64>,
    post_author: Option<String>,
    is_forwarded: bool,
    forwarded_from: Option<i64>,
    media_category: Option<&'static str>,
    media_size: Option<i64>,
    media_handle: Option<String>,
    media_filename: Option<String>,
    media_mime: Option<String>,
}

impl TryFrom<RawMessage> for MessageParams {
    type Error = EngineError;

    fn try_from(msg: RawMessage) -> Result<Self, Self::Error> {
        let ts = msg.timestamp_millis();
        let (media_category, media_size, media_handle, media_filename, media_mime) =
            match msg.attachment {
                Some(att) => (
                    Some(att.category.as_str()),
                    Some(i64::try_from(att.declared_size).map_err(|_| {
                        EngineError::InvalidRequest(format!(
                            "declared media size of message {} exceeds i64",
                            msg.id
                        ))
                    })?),
                    Some(att.handle.0),
                    att.file_name,
                    att.mime_type,
                ),
                None => (None, None, None, None, None),
            };
        Ok(Self {
            message_id: msg.id.0,
            ts,
            edit_ts: msg.edit_timestamp.map(|t| t.timestamp_millis()),
            sender_id: msg.sender.id,
            first_name: msg.sender.first_name,
            last_name: msg.sender.last_name,
            username: msg.sender.username,
            content: msg.content,
            reply_to: msg.linkage.reply_to.map(MessageId::get),
            post_author: msg.linkage.post_author,
            is_forwarded: msg.linkage.is_forwarded,
            forwarded_from: msg.linkage.forwarded_from_channel_id,
            media_category,
            media_size,
            media_handle,
            media_filename,
            media_mime,
        })
    }
}

/// Column values for one media row.
struct MediaParams {
    uuid: String,
    message_id: i64,
    file_path: String,
    file_size: i64,
    mime_type: Option<String>,
    original_filename: Option<String>,
    created_at: i64,
}

impl TryFrom<NewMediaRow> for MediaParams {
    type Error = EngineError;

    fn try_from(row: NewMediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            uuid: row.id.to_string(),
            message_id: row.message_id.0,
            file_path: row.path.to_string_lossy().into_owned(),
            file_size: i64::try_from(row.size).map_err(|_| {
                EngineError::InvalidRequest(format!("media size of {} exceeds i64", row.id))
            })?,
            mime_type: row.mime_type,
            original_filename: row.original_filename,
            created_at: row.created_at_millis,
        })
    }
}

/// A record row as read from `SQLite`, before validation.
struct StoredRow {
    message_id: i64,
    ts: i64,
    edit_ts: Option<i64>,
    sender_id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    content: String,
    reply_to: Option<i64>,
    post_author: Option<String>,
    is_forwarded: bool,
    forwarded_from: Option<i64>,
    media_category: Option<String>,
    media_uuid: Option<String>,
    media_filename: Option<String>,
    media_size: Option<i64>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            message_id: row.get(0)?,
            ts: row.get(1)?,
            edit_ts: row.get(2)?,
            sender_id: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            username: row.get(6)?,
            content: row.get(7)?,
            reply_to: row.get(8)?,
            post_author: row.get(9)?,
            is_forwarded: row.get(10)?,
            forwarded_from: row.get(11)?,
            media_category: row.get(12)?,
            media_uuid: row.get(13)?,
            media_filename: row.get(14)?,
            media_size: row.get(15)?,
        })
    }

    fn into_record(self) -> EngineResult<MessageRecord> {
        let media_category = self
            .media_category
            .as_deref()
            .map(MediaCategory::from_str)
            .transpose()
            .map_err(|err| corrupted(format!("invalid media category: {err}")))?;

        let media = match self.media_uuid {
            Some(uuid) => {
                let id = MediaId::from_str(&uuid)
                    .map_err(|err| corrupted(format!("invalid media uuid {uuid}: {err}")))?;
                let size = u64::try_from(self.media_size.unwrap_or(0))
                    .map_err(|_| corrupted(format!("negative size for media {uuid}")))?;
                Some(MediaRef {
                    id,
                    filename: self.media_filename,
                    size,
                })
            }
            None => None,
        };

        Ok(MessageRecord {
            message_id: MessageId(self.message_id),
            timestamp: stored_timestamp(self.ts)?,
            edit_timestamp: self.edit_ts.map(stored_timestamp).transpose()?,
            sender: SenderInfo {
                id: self.sender_id,
                first_name: self.first_name,
                last_name: self.last_name,
                username: self.username,
            },
            content: self.content,
            linkage: Linkage {
                reply_to: self.reply_to.map(MessageId),
                post_author: self.post_author,
                is_forwarded: self.is_forwarded,
                forwarded_from_channel_id: self.forwarded_from,
            },
            media_category,
            media,
        })
    }
}
