//! File Cache
//!
//! Holds the authoritative in-memory files of one collection. Loads consult
//! memory, then in-flight loads, then the local cache, and finally the
//! backend. Edits stay in memory, marked modified, until `sync` writes them
//! back together with queued deletions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use futures::future::{self, Either, FutureExt};
use tracing::{debug, info, warn};

use super::errors::{LoadError, SyncError, SyncFailure, SyncOp};
use super::loads::{LoadDeduplicator, SharedLoad};
use super::local::LocalCache;
use super::types::{
    DeletionCandidate, FileData, FileEntry, FileKey, LoadObserver, LoadOptions, PendingLoad,
};
use crate::backend::{Backend, RemoteFile, ResponseFormat};
use crate::clock::{Clock, SystemClock};
use crate::config::{FileCacheConfig, SyncFailurePolicy};
use crate::store::StoreConnector;

/// Mutable state, only touched between suspension points
#[derive(Default)]
struct State {
    entries: HashMap<FileKey, FileEntry>,
    /// Queued in call order, unique by value
    deletions: Vec<DeletionCandidate>,
}

struct Inner {
    collection_id: String,
    sync_failure_policy: SyncFailurePolicy,
    backend: Arc<dyn Backend>,
    local: LocalCache,
    loads: LoadDeduplicator,
    state: Mutex<State>,
}

/// Outcome of a fully successful sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub deleted: usize,
}

/// File cache for one collection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FileCache {
    inner: Arc<Inner>,
}

impl FileCache {
    /// Create a file cache
    ///
    /// # Arguments
    /// * `config` - Collection id, local store name and staleness window
    /// * `backend` - Remote file backend
    /// * `connector` - Registry the local store is opened through
    /// * `observer` - Called with every change to the visible pending loads
    pub fn new(
        config: FileCacheConfig,
        backend: Arc<dyn Backend>,
        connector: Arc<StoreConnector>,
        observer: Option<LoadObserver>,
    ) -> Self {
        Self::with_clock(config, backend, connector, observer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: FileCacheConfig,
        backend: Arc<dyn Backend>,
        connector: Arc<StoreConnector>,
        observer: Option<LoadObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let local = LocalCache::with_config(
            connector,
            config.store_name.clone(),
            Duration::from_millis(config.deprecation_time_ms),
            clock,
        );
        Self::from_parts(config, backend, local, observer)
    }

    pub fn from_parts(
        config: FileCacheConfig,
        backend: Arc<dyn Backend>,
        local: LocalCache,
        observer: Option<LoadObserver>,
    ) -> Self {
        info!(
            collection = %config.collection_id,
            store = %local.store_name(),
            "File cache initialized"
        );

        Self {
            inner: Arc::new(Inner {
                collection_id: config.collection_id,
                sync_failure_policy: config.sync_failure_policy,
                backend,
                local,
                loads: LoadDeduplicator::new(observer),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.inner.collection_id
    }

    pub fn local_cache(&self) -> &LocalCache {
        &self.inner.local
    }

    /// In-memory lookup only; never loads
    pub fn get(&self, id: &str, name: &str) -> Option<Bytes> {
        self.inner.get(&FileKey::new(id, name))
    }

    /// Insert or replace a file, marked modified unless `force_unmodified`.
    /// Cancels a pending deletion of the same file.
    pub fn set(&self, id: &str, name: &str, payload: Bytes, force_unmodified: bool) {
        self.inner.set(FileKey::new(id, name), payload, !force_unmodified);
    }

    /// Load a file as [`Bytes`]. See [`FileCache::load_with`].
    pub fn load(
        &self,
        id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Bytes, LoadError>> + Send + 'static {
        self.resolve(FileKey::new(id, name), LoadOptions::default())
    }

    /// Load a file from memory, an in-flight load, the local cache or the
    /// backend, in that order.
    ///
    /// A new load is registered before this returns, so a second call for the
    /// same file joins it even if the first future has not been polled yet.
    /// The fetch runs to completion on the current Tokio runtime even if every
    /// returned future is dropped.
    pub fn load_with(
        &self,
        id: &str,
        name: &str,
        options: LoadOptions,
    ) -> impl Future<Output = Result<FileData, LoadError>> + Send + 'static {
        let format = options.format;
        self.resolve(FileKey::new(id, name), options)
            .map(move |result| result.map(|payload| FileData::new(payload, format)))
    }

    /// Drop a file from memory and queue its deletion on the backend
    pub fn mark_for_deletion(&self, id: &str, name: &str) {
        let key = FileKey::new(id, name);
        let mut state = self.inner.lock();
        state.entries.remove(&key);

        if state.deletions.contains(&key) {
            debug!(file = %key, "File already queued for deletion");
        } else {
            debug!(file = %key, "Queued file for deletion");
            state.deletions.push(key);
        }
    }

    /// Write back every modified file and perform every queued deletion.
    ///
    /// Dirty flags and the deletion queue are cleared before the backend
    /// calls are awaited, so edits made during a sync wait for the next one.
    /// All calls settle before any failure is reported.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        self.inner.sync().await
    }

    /// Keys of files awaiting write-back
    pub fn modified_files(&self) -> Vec<FileKey> {
        let state = self.inner.lock();
        let mut modified: Vec<FileKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.modified)
            .map(|(key, _)| key.clone())
            .collect();
        modified.sort();
        modified
    }

    pub fn deletion_candidates(&self) -> Vec<DeletionCandidate> {
        self.inner.lock().deletions.clone()
    }

    pub fn pending_loads(&self) -> Vec<PendingLoad> {
        self.inner.loads.pending()
    }

    /// Number of files held in memory
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Discard the locally persisted copy of one file
    pub async fn invalidate_local(&self, id: &str, name: &str) {
        let key = self.inner.record_key(&FileKey::new(id, name));
        self.inner.local.delete(&key).await;
    }

    /// Discard every locally persisted file in this cache's store
    pub async fn clear_local(&self) {
        self.inner.local.clear().await;
    }

    fn resolve(
        &self,
        key: FileKey,
        options: LoadOptions,
    ) -> impl Future<Output = Result<Bytes, LoadError>> + Send + 'static {
        if let Some(payload) = self.inner.get(&key) {
            debug!(file = %key, "File cache HIT");
            return Either::Left(future::ready(Ok(payload)));
        }

        // Memory is checked again under the load lock: a load that finished
        // since the first check has stored its payload before unregistering
        let registered = self.inner.loads.get_or_add(&key, options.silent, || {
            if let Some(payload) = self.inner.get(&key) {
                return Err(payload);
            }

            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            Ok(async move { inner.fetch(key, options.remote_timestamp).await }
                .boxed()
                .shared())
        });

        let (pending, started) = match registered {
            Ok(registered) => registered,
            Err(payload) => {
                debug!(file = %key, "File cache HIT");
                return Either::Left(future::ready(Ok(payload)));
            }
        };

        if started {
            debug!(file = %key, silent = options.silent, "File cache MISS, loading");
            drive(&pending);
        }

        Either::Right(pending)
    }
}

/// Poll a new load to completion in the background when a runtime exists
fn drive(pending: &SharedLoad) {
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        let pending = pending.clone();
        runtime.spawn(async move {
            let _ = pending.await;
        });
    }
}

impl Inner {
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_key(&self, key: &FileKey) -> String {
        LocalCache::record_key(&self.collection_id, &key.id, &key.name)
    }

    fn get(&self, key: &FileKey) -> Option<Bytes> {
        self.lock().entries.get(key).map(|entry| entry.payload.clone())
    }

    fn set(&self, key: FileKey, payload: Bytes, modified: bool) {
        let mut state = self.lock();

        // A file that is set again is no longer to be deleted
        state.deletions.retain(|candidate| *candidate != key);

        match state.entries.get_mut(&key) {
            Some(entry) => {
                entry.payload = payload;
                entry.modified = modified;
            }
            None => {
                state.entries.insert(key, FileEntry { payload, modified });
            }
        }
    }

    /// Store a loaded payload as a clean entry, unless the caller got there
    /// first: an entry set while the load was running is kept, and a file
    /// queued for deletion stays queued. Returns whether the payload was stored.
    fn insert_loaded(&self, key: &FileKey, payload: Bytes) -> bool {
        let mut state = self.lock();
        if state.entries.contains_key(key) || state.deletions.contains(key) {
            return false;
        }

        state.entries.insert(
            key.clone(),
            FileEntry {
                payload,
                modified: false,
            },
        );
        true
    }

    /// Local cache, then backend. Always clears the load record.
    async fn fetch(
        self: Arc<Self>,
        key: FileKey,
        remote_timestamp: Option<u64>,
    ) -> Result<Bytes, LoadError> {
        let record_key = self.record_key(&key);

        let result = match self.local.get(&record_key, remote_timestamp).await {
            Some(record) => Ok(record.data),
            None => {
                debug!(file = %key, "Fetching from backend");
                match self
                    .backend
                    .get_file(&self.collection_id, &key.id, &key.name, ResponseFormat::Blob)
                    .await
                {
                    Ok(data) => {
                        self.local.put(&record_key, data.clone(), None).await;
                        Ok(data)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(data) => {
                if !self.insert_loaded(&key, data.clone()) {
                    debug!(file = %key, "File changed while loading, keeping local state");
                }
                self.loads.remove(&key);
                debug!(file = %key, size = data.len(), "Loaded file");
                Ok(data)
            }
            Err(e) => {
                warn!(
                    file = %key,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to load file"
                );
                self.loads.remove(&key);
                Err(LoadError::RemoteFetchFailed {
                    key,
                    source: Arc::new(e),
                })
            }
        }
    }

    async fn sync(&self) -> Result<SyncReport, SyncError> {
        let (updates, deletions) = {
            let mut state = self.lock();
            let updates: Vec<(FileKey, Bytes)> = state
                .entries
                .iter_mut()
                .filter(|(_, entry)| entry.modified)
                .map(|(key, entry)| {
                    entry.modified = false;
                    (key.clone(), entry.payload.clone())
                })
                .collect();
            let deletions = std::mem::take(&mut state.deletions);
            (updates, deletions)
        };

        let attempted = updates.len() + deletions.len();
        if attempted == 0 {
            debug!(collection = %self.collection_id, "Nothing to sync");
            return Ok(SyncReport::default());
        }

        info!(
            collection = %self.collection_id,
            updates = updates.len(),
            deletions = deletions.len(),
            "Syncing files"
        );

        let update_batch = future::join_all(updates.into_iter().map(|(key, payload)| async move {
            let file = RemoteFile::new(key.name.clone(), payload.clone());
            let result = self
                .backend
                .update_file(&self.collection_id, &key.id, file)
                .await;
            (key, payload, result)
        }));

        let delete_batch = future::join_all(deletions.into_iter().map(|key| async move {
            let result = self
                .backend
                .delete_file(&self.collection_id, &key.id, &key.name)
                .await;
            (key, result)
        }));

        let (update_results, delete_results) = futures::join!(update_batch, delete_batch);

        let mut report = SyncReport::default();
        let mut failures = Vec::new();

        for (key, payload, result) in update_results {
            match result {
                Ok(()) => report.updated += 1,
                Err(error) => {
                    warn!(
                        file = %key,
                        error = %error,
                        transient = error.is_transient(),
                        "Failed to update file"
                    );
                    self.requeue_update(&key, &payload);
                    failures.push(SyncFailure {
                        key,
                        op: SyncOp::Update,
                        error,
                    });
                }
            }
        }

        for (key, result) in delete_results {
            match result {
                Ok(()) => report.deleted += 1,
                Err(error) => {
                    warn!(
                        file = %key,
                        error = %error,
                        transient = error.is_transient(),
                        "Failed to delete file"
                    );
                    self.requeue_deletion(&key);
                    failures.push(SyncFailure {
                        key,
                        op: SyncOp::Delete,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            info!(
                collection = %self.collection_id,
                updated = report.updated,
                deleted = report.deleted,
                "Sync complete"
            );
            Ok(report)
        } else {
            Err(SyncError {
                attempted,
                failures,
            })
        }
    }

    /// Re-mark a failed update, unless the file changed or went away meanwhile
    fn requeue_update(&self, key: &FileKey, payload: &Bytes) {
        if self.sync_failure_policy != SyncFailurePolicy::Requeue {
            return;
        }

        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            if !entry.modified && entry.payload == *payload {
                entry.modified = true;
                debug!(file = %key, "Re-marked file as modified");
            }
        }
    }

    /// Re-queue a failed deletion, unless the file was set again meanwhile
    fn requeue_deletion(&self, key: &FileKey) {
        if self.sync_failure_policy != SyncFailurePolicy::Requeue {
            return;
        }

        let mut state = self.lock();
        if !state.entries.contains_key(key) && !state.deletions.contains(key) {
            state.deletions.push(key.clone());
            debug!(file = %key, "Re-queued file for deletion");
        }
    }
}
