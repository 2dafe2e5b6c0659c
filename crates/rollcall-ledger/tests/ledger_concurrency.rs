//! Concurrent `record` calls for the same identity and day.

use rollcall_ledger::{AttendanceLedger, JsonFileStore, LedgerBackend, LedgerStore, SqliteStore};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn race(ledger: Arc<AttendanceLedger>, threads: usize) -> usize {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.record("alice").unwrap()
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|first| *first)
        .count()
}

#[test]
fn concurrent_records_json_yield_one_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("attendance.json");
    let ledger = Arc::new(AttendanceLedger::open(LedgerBackend::Json, &path).unwrap());

    assert_eq!(race(Arc::clone(&ledger), 8), 1);
    assert_eq!(JsonFileStore::new(&path).load_all().unwrap().len(), 1);
}

#[test]
fn concurrent_records_sqlite_yield_one_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("attendance.db");
    let ledger = Arc::new(AttendanceLedger::open(LedgerBackend::Sqlite, &path).unwrap());

    assert_eq!(race(Arc::clone(&ledger), 8), 1);
    drop(ledger);
    assert_eq!(SqliteStore::open(&path).unwrap().load_all().unwrap().len(), 1);
}

#[test]
fn two_ledgers_on_one_file_do_not_duplicate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("attendance.json");
    let a = AttendanceLedger::open(LedgerBackend::Json, &path).unwrap();
    let b = AttendanceLedger::open(LedgerBackend::Json, &path).unwrap();

    assert!(a.record("bob").unwrap());
    assert!(!b.record("bob").unwrap());
    assert_eq!(b.load_all().unwrap().len(), 1);
}
