//! Load Deduplicator
//!
//! Tracks in-flight fetches so concurrent requests for the same file share
//! one result, and reports visible (non-silent) loads to an observer.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use tracing::{trace, warn};

use super::errors::LoadError;
use super::types::{FileKey, LoadObserver, PendingLoad};

/// The outcome of a fetch, awaitable by any number of callers
pub type SharedLoad = Shared<BoxFuture<'static, Result<Bytes, LoadError>>>;

struct LoadRecord {
    pending: SharedLoad,
    silent: bool,
}

#[derive(Default)]
struct Loads {
    records: BTreeMap<FileKey, LoadRecord>,
    /// Bumped on every visible change; orders announcements
    version: u64,
}

impl Loads {
    /// Snapshot for the observer after a visible change
    fn changed(&mut self) -> Snapshot {
        self.version += 1;
        Snapshot {
            version: self.version,
            pending: visible(&self.records),
        }
    }
}

struct Snapshot {
    version: u64,
    pending: Vec<PendingLoad>,
}

/// At most one in-flight load per file
pub struct LoadDeduplicator {
    loads: Mutex<Loads>,
    /// Version of the last snapshot handed to the observer
    announced: Mutex<u64>,
    observer: Option<LoadObserver>,
}

impl LoadDeduplicator {
    pub fn new(observer: Option<LoadObserver>) -> Self {
        Self {
            loads: Mutex::new(Loads::default()),
            announced: Mutex::new(0),
            observer,
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Loads> {
        // Records are plain data; a panic elsewhere cannot leave them half-written
        self.loads.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The shared result of an in-flight load, if any
    pub fn get(&self, key: &FileKey) -> Option<SharedLoad> {
        self.lock().records.get(key).map(|record| record.pending.clone())
    }

    /// Register an in-flight load. Non-silent loads notify the observer.
    pub fn add(&self, key: FileKey, pending: SharedLoad, silent: bool) {
        let snapshot = {
            let mut loads = self.lock();
            if loads.records.contains_key(&key) {
                warn!(file = %key, "Replacing an in-flight load record");
            }
            loads.records.insert(key, LoadRecord { pending, silent });
            (!silent).then(|| loads.changed())
        };

        if let Some(snapshot) = snapshot {
            self.announce(snapshot);
        }
    }

    /// Return the in-flight load for `key`, or register the one built by
    /// `start`. The flag is true when a new load was registered.
    ///
    /// `start` runs under the deduplicator lock and may decline to start a
    /// load; its error is passed through and nothing is registered.
    pub fn get_or_add<E>(
        &self,
        key: &FileKey,
        silent: bool,
        start: impl FnOnce() -> Result<SharedLoad, E>,
    ) -> Result<(SharedLoad, bool), E> {
        let (pending, snapshot) = {
            let mut loads = self.lock();
            if let Some(record) = loads.records.get(key) {
                trace!(file = %key, "Joining in-flight load");
                return Ok((record.pending.clone(), false));
            }

            let pending = start()?;
            loads.records.insert(
                key.clone(),
                LoadRecord {
                    pending: pending.clone(),
                    silent,
                },
            );
            (pending, (!silent).then(|| loads.changed()))
        };

        if let Some(snapshot) = snapshot {
            self.announce(snapshot);
        }
        Ok((pending, true))
    }

    /// Forget the load for `key`. A no-op when none is registered.
    pub fn remove(&self, key: &FileKey) {
        let snapshot = {
            let mut loads = self.lock();
            match loads.records.remove(key) {
                Some(record) if !record.silent => Some(loads.changed()),
                _ => None,
            }
        };

        if let Some(snapshot) = snapshot {
            self.announce(snapshot);
        }
    }

    /// Visible pending loads, ordered by file id then name
    pub fn pending(&self) -> Vec<PendingLoad> {
        visible(&self.lock().records)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    // Runs without the records lock so observers may call `pending`. Observers
    // must not register or remove loads. Deliveries are serialized and a
    // snapshot older than one already delivered is dropped, so the observer
    // never goes back to an outdated view.
    fn announce(&self, snapshot: Snapshot) {
        let Some(observer) = &self.observer else {
            return;
        };

        let mut announced = self.announced.lock().unwrap_or_else(|e| e.into_inner());
        if snapshot.version <= *announced {
            trace!(version = snapshot.version, "Dropping outdated pending loads snapshot");
            return;
        }
        *announced = snapshot.version;

        trace!(pending = snapshot.pending.len(), "Announcing pending loads");
        observer(&snapshot.pending);
    }
}

fn visible(loads: &BTreeMap<FileKey, LoadRecord>) -> Vec<PendingLoad> {
    loads
        .iter()
        .filter(|(_, record)| !record.silent)
        .map(|(key, _)| PendingLoad::from(key))
        .collect()
}
