//! Open-store cache and per-conversation write locks.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::cache::core::errors::{EngineError, EngineResult};
use crate::cache::core::ids::ConversationId;
use crate::cache::storage::paths::{ConversationPaths, channels_dir};
use crate::cache::storage::range_store::SqliteRangeStore;

/// Hands out range stores and serializes writers per conversation.
///
/// Stores are opened lazily and kept in an LRU bounded by the configured
/// capacity. An evicted store stays alive while a request still holds its
/// `Arc`. The LRU mutex is never held while a database opens; a separate
/// per-conversation lock keeps one conversation from being opened twice.
/// Write locks are never evicted, so two writers of the same conversation
/// always contend on the same mutex.
pub struct StoreRegistry {
    data_dir: PathBuf,
    stores: Mutex<LruCache<ConversationId, Arc<SqliteRangeStore>>>,
    open_locks: DashMap<ConversationId, Arc<Mutex<()>>>,
    write_locks: DashMap<ConversationId, Arc<Mutex<()>>>,
}

impl StoreRegistry {
    /// Create a registry rooted at `data_dir`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `capacity` is zero.
    pub fn new(data_dir: impl Into<PathBuf>, capacity: usize) -> EngineResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            EngineError::InvalidConfig("storage.open_store_capacity must be > 0".to_string())
        })?;
        Ok(Self {
            data_dir: data_dir.into(),
            stores: Mutex::new(LruCache::new(capacity)),
            open_locks: DashMap::new(),
            write_locks: DashMap::new(),
        })
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the store for `conversation`, creating its partition on first use.
    ///
    /// # Errors
    /// Returns an error if the partition cannot be created or opened.
    pub async fn store(&self, conversation: &ConversationId) -> EngineResult<Arc<SqliteRangeStore>> {
        if let Some(store) = self.cached(conversation).await {
            return Ok(store);
        }

        let _opening = conversation_lock(&self.open_locks, conversation)
            .lock_owned()
            .await;
        if let Some(store) = self.cached(conversation).await {
            return Ok(store);
        }

        let paths = ConversationPaths::new(&self.data_dir, conversation);
        let store = Arc::new(SqliteRangeStore::open(paths).await?);
        let displaced = self
            .stores
            .lock()
            .await
            .push(conversation.clone(), Arc::clone(&store));
        if let Some((evicted, _)) = displaced {
            if &evicted != conversation {
                debug!(conversation = %evicted, "Evicted conversation store from cache");
            }
        }
        Ok(store)
    }

    async fn cached(&self, conversation: &ConversationId) -> Option<Arc<SqliteRangeStore>> {
        self.stores.lock().await.get(conversation).map(Arc::clone)
    }

    /// Get the store only if the partition already exists on disk.
    ///
    /// # Errors
    /// Returns an error if an existing partition cannot be opened.
    pub async fn existing_store(
        &self,
        conversation: &ConversationId,
    ) -> EngineResult<Option<Arc<SqliteRangeStore>>> {
        let paths = ConversationPaths::new(&self.data_dir, conversation);
        if !tokio::fs::try_exists(&paths.db_file).await? {
            return Ok(None);
        }
        self.store(conversation).await.map(Some)
    }

    /// Acquire the exclusive write lock of `conversation`.
    pub async fn lock_writes(&self, conversation: &ConversationId) -> OwnedMutexGuard<()> {
        conversation_lock(&self.write_locks, conversation)
            .lock_owned()
            .await
    }

    /// Conversations that have a partition directory under the data dir.
    ///
    /// # Errors
    /// Returns an error if the channels directory cannot be listed.
    pub async fn known_conversations(&self) -> EngineResult<Vec<ConversationId>> {
        let dir = channels_dir(&self.data_dir);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match ConversationId::new(name) {
                Ok(id) => found.push(id),
                Err(err) => debug!(entry = name, error = %err, "Skipping foreign directory"),
            }
        }
        found.sort();
        Ok(found)
    }
}

fn conversation_lock(
    locks: &DashMap<ConversationId, Arc<Mutex<()>>>,
    conversation: &ConversationId,
) -> Arc<Mutex<()>> {
    locks
        .entry(conversation.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}
