//! Integration tests for transposition-table persistence.

use std::sync::Arc;

use honeycomb_engine::{Flag, PersistError, PersistStatus, TranspositionTable, TtEntry};

fn entry(value: i32, depth: i32, flag: Flag, best_move: i32) -> TtEntry {
    TtEntry {
        value,
        depth,
        flag,
        best_move,
    }
}

#[test]
fn save_then_load_reproduces_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");

    let original = TranspositionTable::with_path(path.clone());
    let entries = [
        (1u64, entry(10, 2, Flag::Exact, 4)),
        (2u64, entry(-3, 5, Flag::LowerBound, TtEntry::NO_MOVE)),
        ((1u64 << 55) | 1, entry(77, 1, Flag::UpperBound, 54)),
    ];
    for (key, value) in entries {
        original.put(key, value);
    }

    let saved = original.save_async().wait().unwrap();
    assert_eq!(saved, entries.len());
    assert_eq!(original.status(), PersistStatus::Ready);

    let restored = TranspositionTable::with_path(path);
    let loaded = restored.load_async().wait().unwrap();
    assert_eq!(loaded, entries.len());
    assert_eq!(restored.status(), PersistStatus::Ready);
    assert_eq!(restored.len(), entries.len());
    for (key, value) in entries {
        assert_eq!(restored.get(key), Some(value), "entry {key}");
    }
}

#[test]
fn replacement_sequence_survives_a_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");

    let table = TranspositionTable::with_path(path.clone());
    table.put(7, entry(5, 1, Flag::Exact, TtEntry::NO_MOVE));
    table.put(7, entry(8, 3, Flag::LowerBound, 12));
    table.put(7, entry(4, 2, Flag::UpperBound, 9));
    assert_eq!(table.get(7), Some(entry(8, 3, Flag::LowerBound, 12)));

    table.save_async().wait().unwrap();

    let restored = TranspositionTable::with_path(path);
    restored.load_async().wait().unwrap();
    assert_eq!(restored.get(7), Some(entry(8, 3, Flag::LowerBound, 12)));
}

#[test]
fn missing_file_fails_the_load_and_reverts_the_status() {
    let dir = tempfile::tempdir().unwrap();
    let table = TranspositionTable::with_path(dir.path().join("absent.bin"));

    let result = table.load_async().wait();
    assert!(matches!(result, Err(PersistError::Io { .. })));
    assert_eq!(table.status(), PersistStatus::NotLoaded);
    assert!(table.is_empty());
}

#[test]
fn status_subscription_sees_the_save_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let table = TranspositionTable::with_path(dir.path().join("table.bin"));
    table.put(1, entry(1, 1, Flag::Exact, -1));

    let updates = table.subscribe_status();
    table.save_async().wait().unwrap();

    assert_eq!(updates.recv().unwrap(), PersistStatus::Saving);
    assert_eq!(updates.recv().unwrap(), PersistStatus::Ready);
}

#[test]
fn concurrent_loads_coalesce_onto_one_task() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");

    // A file with 200k records takes the worker long enough to read that a
    // second load issued back-to-back still finds the first in flight.
    let table = TranspositionTable::with_path(path.clone());
    for key in 0..200_000u64 {
        table.put(key, entry(key as i32, (key % 7) as i32 + 1, Flag::Exact, -1));
    }
    table.save_async().wait().unwrap();

    let restored = Arc::new(TranspositionTable::with_path(path));
    let first = restored.load_async();
    let second = restored.load_async();
    assert!(
        first.shares_state_with(&second),
        "loads issued while one is in flight must share a task"
    );

    let count_first = first.wait().unwrap();
    let count_second = second.wait().unwrap();
    assert_eq!(count_first, count_second);
    assert_eq!(restored.len(), 200_000);
}

#[test]
fn loads_after_completion_start_a_fresh_task() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");

    let table = TranspositionTable::with_path(path.clone());
    table.put(1, entry(1, 1, Flag::Exact, -1));
    table.save_async().wait().unwrap();

    let restored = TranspositionTable::with_path(path);
    let first = restored.load_async();
    first.wait().unwrap();
    let second = restored.load_async();
    assert!(!first.shares_state_with(&second));
    second.wait().unwrap();
}

#[test]
fn load_merges_depth_preferred_into_a_warm_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");

    let table = TranspositionTable::with_path(path.clone());
    table.put(9, entry(1, 2, Flag::Exact, 3));
    table.save_async().wait().unwrap();

    let warm = TranspositionTable::with_path(path);
    warm.put(9, entry(50, 6, Flag::Exact, 7));
    warm.load_async().wait().unwrap();

    // The live entry is deeper than the persisted one and survives.
    assert_eq!(warm.get(9), Some(entry(50, 6, Flag::Exact, 7)));
}
