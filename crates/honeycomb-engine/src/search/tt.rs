//! Concurrent transposition table keyed by symmetry-canonical positions.
//!
//! Backed by a sharded concurrent map; `get`/`put` are safe from any search
//! thread and never touch the disk. Replacement is depth-preferred and
//! atomic per key: the decision is made under the map's entry lock and
//! reported to the registered observers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::search::persist::{Persistence, PersistStatus, PersistTask};

/// Bound kind of a stored value. The discriminants are the on-disk ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    /// The value is exact.
    Exact = 0,
    /// The value is a lower bound (fail high).
    LowerBound = 1,
    /// The value is an upper bound (fail low).
    UpperBound = 2,
}

impl Flag {
    /// Decode an on-disk ordinal.
    pub const fn from_ordinal(ordinal: i8) -> Option<Flag> {
        match ordinal {
            0 => Some(Flag::Exact),
            1 => Some(Flag::LowerBound),
            2 => Some(Flag::UpperBound),
            _ => None,
        }
    }
}

/// One cached search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtEntry {
    /// Value of the position, valid for searches of at most `depth` plies.
    pub value: i32,
    /// Remaining search depth the value was computed with.
    pub depth: i32,
    /// How `value` bounds the true score.
    pub flag: Flag,
    /// Best move found, or [`TtEntry::NO_MOVE`].
    pub best_move: i32,
}

impl TtEntry {
    /// Sentinel for an unknown best move.
    pub const NO_MOVE: i32 = -1;
}

/// Outcome of one `put`, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtUpdate {
    /// Entry previously stored under the key, if any.
    pub previous: Option<TtEntry>,
    /// Entry stored under the key after the operation.
    pub stored: TtEntry,
    /// Whether the operation changed the stored entry.
    pub replaced: bool,
}

type Observer = Box<dyn Fn(u64, &TtUpdate) + Send + Sync>;

/// Concurrent, persistable transposition table.
pub struct TranspositionTable {
    map: Arc<DashMap<u64, TtEntry>>,
    last_update: Mutex<Option<TtUpdate>>,
    observers: Mutex<Vec<Observer>>,
    persistence: Persistence,
}

impl TranspositionTable {
    /// Create a table persisted at the default location
    /// (`~/.honeycomb/transposition-table.bin`).
    pub fn new() -> Self {
        Self::with_optional_path(Persistence::default_path())
    }

    /// Create a table persisted at `path`.
    pub fn with_path(path: PathBuf) -> Self {
        Self::with_optional_path(Some(path))
    }

    fn with_optional_path(path: Option<PathBuf>) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            last_update: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            persistence: Persistence::new(path),
        }
    }

    /// Look up a position. Lock-free for readers of other shards.
    pub fn get(&self, key: u64) -> Option<TtEntry> {
        self.map.get(&key).map(|entry| *entry)
    }

    /// Store a position with depth-preferred replacement.
    ///
    /// An existing entry of greater or equal depth wins; otherwise the new
    /// entry replaces it. The returned [`TtUpdate`] describes what happened
    /// and is also pushed to [`last_update`](Self::last_update) and to every
    /// registered observer.
    pub fn put(&self, key: u64, entry: TtEntry) -> TtUpdate {
        let update = match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                let previous = *occupied.get();
                if previous.depth >= entry.depth {
                    TtUpdate {
                        previous: Some(previous),
                        stored: previous,
                        replaced: false,
                    }
                } else {
                    occupied.insert(entry);
                    TtUpdate {
                        previous: Some(previous),
                        stored: entry,
                        replaced: true,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                TtUpdate {
                    previous: None,
                    stored: entry,
                    replaced: true,
                }
            }
        };

        *self.last_update.lock().expect("last_update poisoned") = Some(update);
        for observer in self.observers.lock().expect("observers poisoned").iter() {
            observer(key, &update);
        }

        update
    }

    /// The most recent `put` outcome.
    pub fn last_update(&self) -> Option<TtUpdate> {
        *self.last_update.lock().expect("last_update poisoned")
    }

    /// Register an observer invoked after every `put`.
    pub fn register_observer<F>(&self, observer: F)
    where
        F: Fn(u64, &TtUpdate) + Send + Sync + 'static,
    {
        self.observers
            .lock()
            .expect("observers poisoned")
            .push(Box::new(observer));
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The persistence path, if one is configured.
    pub fn path(&self) -> Option<&Path> {
        self.persistence.path()
    }

    /// Current persistence status.
    pub fn status(&self) -> PersistStatus {
        self.persistence.status()
    }

    /// Subscribe to persistence status transitions.
    pub fn subscribe_status(&self) -> Receiver<PersistStatus> {
        self.persistence.subscribe()
    }

    /// Write a snapshot of the table to disk on the IO worker.
    ///
    /// Status runs `Saving -> Ready`, reverting to `NotLoaded` on failure.
    pub fn save_async(&self) -> PersistTask {
        let entries: Vec<(u64, TtEntry)> = self
            .map
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        self.persistence.save(entries)
    }

    /// Merge the persisted file into the table on the IO worker.
    ///
    /// Status runs `Loading -> Ready`, reverting to `NotLoaded` on failure.
    /// Loads issued while one is in flight coalesce onto the same task.
    pub fn load_async(&self) -> PersistTask {
        self.persistence.load(Arc::clone(&self.map))
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("entries", &self.map.len())
            .field("status", &self.status())
            .field("path", &self.persistence.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Flag, TranspositionTable, TtEntry, TtUpdate};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> TranspositionTable {
        let dir = tempfile::tempdir().unwrap();
        TranspositionTable::with_path(dir.path().join("table.bin"))
    }

    fn entry(value: i32, depth: i32, flag: Flag, best_move: i32) -> TtEntry {
        TtEntry {
            value,
            depth,
            flag,
            best_move,
        }
    }

    #[test]
    fn get_miss_returns_none() {
        assert_eq!(table().get(99), None);
    }

    #[test]
    fn put_then_get_roundtrip() {
        let tt = table();
        let stored = entry(42, 3, Flag::Exact, 7);
        tt.put(5, stored);
        assert_eq!(tt.get(5), Some(stored));
        assert_eq!(tt.len(), 1);
    }

    #[test]
    fn deeper_entry_wins() {
        let tt = table();
        tt.put(7, entry(5, 1, Flag::Exact, TtEntry::NO_MOVE));
        tt.put(7, entry(8, 3, Flag::LowerBound, 12));
        tt.put(7, entry(4, 2, Flag::UpperBound, 9));
        assert_eq!(tt.get(7), Some(entry(8, 3, Flag::LowerBound, 12)));
    }

    #[test]
    fn equal_depth_keeps_the_existing_entry() {
        let tt = table();
        let first = entry(1, 4, Flag::Exact, 3);
        tt.put(11, first);
        let update = tt.put(11, entry(2, 4, Flag::Exact, 5));
        assert!(!update.replaced);
        assert_eq!(tt.get(11), Some(first));
    }

    #[test]
    fn last_update_reports_the_replacement_triple() {
        let tt = table();
        let shallow = entry(5, 1, Flag::Exact, TtEntry::NO_MOVE);
        let deep = entry(8, 3, Flag::LowerBound, 12);

        tt.put(7, shallow);
        assert_eq!(
            tt.last_update(),
            Some(TtUpdate {
                previous: None,
                stored: shallow,
                replaced: true,
            })
        );

        tt.put(7, deep);
        assert_eq!(
            tt.last_update(),
            Some(TtUpdate {
                previous: Some(shallow),
                stored: deep,
                replaced: true,
            })
        );

        tt.put(7, shallow);
        assert_eq!(
            tt.last_update(),
            Some(TtUpdate {
                previous: Some(deep),
                stored: deep,
                replaced: false,
            })
        );
    }

    #[test]
    fn observers_see_every_put() {
        let tt = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        tt.register_observer(move |key, update| {
            assert_eq!(key, 3);
            assert!(update.replaced);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        tt.put(3, entry(1, 1, Flag::Exact, -1));
        tt.put(3, entry(2, 2, Flag::Exact, -1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_empties_the_table() {
        let tt = table();
        tt.put(1, entry(1, 1, Flag::Exact, -1));
        tt.put(2, entry(2, 2, Flag::Exact, -1));
        tt.clear();
        assert!(tt.is_empty());
        assert_eq!(tt.get(1), None);
    }

    #[test]
    fn flag_ordinal_roundtrip() {
        for flag in [Flag::Exact, Flag::LowerBound, Flag::UpperBound] {
            assert_eq!(Flag::from_ordinal(flag as i8), Some(flag));
        }
        assert_eq!(Flag::from_ordinal(3), None);
        assert_eq!(Flag::from_ordinal(-1), None);
    }

    #[test]
    fn concurrent_puts_do_not_lose_the_deepest_entry() {
        let tt = Arc::new(table());
        std::thread::scope(|scope| {
            for depth in 1..=8 {
                let tt = Arc::clone(&tt);
                scope.spawn(move || {
                    for key in 0..100u64 {
                        tt.put(key, entry(depth * 10, depth, Flag::Exact, -1));
                    }
                });
            }
        });
        for key in 0..100u64 {
            assert_eq!(tt.get(key).unwrap().depth, 8);
        }
    }
}
