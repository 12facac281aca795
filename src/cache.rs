//! # Store Handle Cache
//!
//! Keeps one open read connection per profile and reuses it while the
//! profile keeps resolving to the same path. Each profile has its own slot
//! mutex; it is held across "close stale, open new, run query" so no caller
//! can observe a handle that another caller is closing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::access::{self, ResolvedStore};
use crate::error::HistoryError;

struct Slot {
    store: ResolvedStore,
    conn: Connection,
}

type SlotRef = Arc<Mutex<Option<Slot>>>;

/// Borrowed view of a cached connection, valid while the slot lock is held.
pub struct StoreHandle<'a> {
    store: &'a ResolvedStore,
    conn: &'a Connection,
}

impl<'a> StoreHandle<'a> {
    pub(crate) fn new(store: &'a ResolvedStore, conn: &'a Connection) -> Self {
        Self { store, conn }
    }

    pub fn store(&self) -> &ResolvedStore {
        self.store
    }

    pub fn profile_name(&self) -> &str {
        &self.store.profile.name
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }
}

pub struct StoreHandleCache {
    slots: Mutex<HashMap<PathBuf, SlotRef>>,
    busy_timeout: Duration,
}

impl StoreHandleCache {
    pub fn new(busy_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            busy_timeout,
        }
    }

    /// Run `f` against the cached handle for `store`, opening or replacing it first.
    ///
    /// A handle whose query fails with a read error is dropped so the next call
    /// reopens the store.
    pub fn with_handle<T, F>(&self, store: &ResolvedStore, f: F) -> Result<T, HistoryError>
    where
        F: FnOnce(&StoreHandle<'_>) -> Result<T, HistoryError>,
    {
        let slot = self.slot_for(&store.profile.store_path);
        let mut guard = lock(&slot);

        let open = match guard.take() {
            Some(cached) if cached.store.read_path == store.read_path => {
                debug!(
                    profile = %store.profile.name,
                    path = %store.read_path.display(),
                    "handle reused"
                );
                cached
            }
            Some(cached) if supersedes(&cached.store, store) => {
                debug!(
                    profile = %store.profile.name,
                    requested = %store.read_path.display(),
                    cached = %cached.store.read_path.display(),
                    "newer snapshot already open"
                );
                if store.snapshot < cached.store.snapshot {
                    access::discard_snapshot(store);
                }
                cached
            }
            stale => {
                if let Some(stale) = stale {
                    close_slot(stale);
                }
                let conn = open_store(&store.read_path, self.busy_timeout).map_err(|source| {
                    HistoryError::StoreRead {
                        profile: store.profile.name.clone(),
                        source,
                    }
                })?;
                info!(
                    profile = %store.profile.name,
                    path = %store.read_path.display(),
                    "handle opened"
                );
                Slot {
                    store: store.clone(),
                    conn,
                }
            }
        };

        let open = guard.insert(open);
        let result = f(&StoreHandle::new(&open.store, &open.conn));
        if matches!(result, Err(HistoryError::StoreRead { .. })) {
            if let Some(broken) = guard.take() {
                close_slot(broken);
            }
        }
        result
    }

    /// Close the handle opened on `path`, matching either a profile's store
    /// path or the resolved path it was read from. Returns whether one was closed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let mut closed = false;
        for slot in self.all_slots() {
            let mut guard = lock(&slot);
            let matches = guard.as_ref().is_some_and(|s| {
                s.store.read_path == path || s.store.profile.store_path == path
            });
            if matches {
                if let Some(stale) = guard.take() {
                    close_slot(stale);
                    closed = true;
                }
            }
        }
        closed
    }

    /// Close every cached handle and remove the snapshots they were reading.
    pub fn close_all(&self) {
        for slot in self.all_slots() {
            if let Some(open) = lock(&slot).take() {
                close_slot(open);
            }
        }
    }

    /// Number of currently open handles.
    pub fn open_handles(&self) -> usize {
        self.all_slots()
            .into_iter()
            .filter(|slot| lock(slot).is_some())
            .count()
    }

    /// Resolved path currently cached for a profile store, if any.
    pub fn cached_path(&self, profile_store: &Path) -> Option<PathBuf> {
        let slot = lock(&self.slots).get(profile_store).cloned()?;
        let guard = lock(&slot);
        guard.as_ref().map(|s| s.store.read_path.clone())
    }

    fn slot_for(&self, key: &Path) -> SlotRef {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(key.to_path_buf()).or_default())
    }

    // Slots are never removed from the map: a removed slot could still be held
    // by a caller while a fresh one for the same profile opens a second handle.
    fn all_slots(&self) -> Vec<SlotRef> {
        lock(&self.slots).values().cloned().collect()
    }
}

impl Drop for StoreHandleCache {
    fn drop(&mut self) {
        self.close_all();
    }
}

pub(crate) fn open_store(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Whether the cached snapshot is newer than the one a caller resolved.
///
/// A caller that resolved before the source changed must not replace a
/// handle opened on a later copy, and a snapshot that is already gone cannot
/// replace anything.
fn supersedes(cached: &ResolvedStore, requested: &ResolvedStore) -> bool {
    match (cached.snapshot, requested.snapshot) {
        (Some(cached_gen), Some(requested_gen)) => {
            cached_gen > requested_gen || !requested.read_path.exists()
        }
        _ => false,
    }
}

fn close_slot(slot: Slot) {
    let Slot { store, conn } = slot;
    match conn.close() {
        Ok(()) => debug!(
            profile = %store.profile.name,
            path = %store.read_path.display(),
            "stale handle closed"
        ),
        Err((_conn, err)) => {
            warn!(profile = %store.profile.name, error = %err, "handle close failed")
        }
    }
    access::discard_snapshot(&store);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
