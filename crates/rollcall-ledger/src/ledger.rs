//! First-seen-per-day attendance ledger.

use crate::json_file::JsonFileStore;
use crate::record::AttendanceRecord;
use crate::sqlite::SqliteStore;
use crate::store::{LedgerError, LedgerStore};
use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::path::Path;
use std::str::FromStr;

/// Which [`LedgerStore`] to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Json,
    Sqlite,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LedgerBackend::Json),
            "sqlite" | "sqlite3" => Ok(LedgerBackend::Sqlite),
            other => Err(format!("unknown ledger backend {other:?} (expected json or sqlite)")),
        }
    }
}

/// Shared attendance ledger.
///
/// The check for an existing `(name, date)` and the append happen under one
/// lock, so concurrent callers for the same identity see exactly one `true`.
pub struct AttendanceLedger {
    store: Mutex<Box<dyn LedgerStore>>,
    backend: &'static str,
}

impl AttendanceLedger {
    pub fn new(store: Box<dyn LedgerStore>) -> Self {
        let backend = store.backend();
        Self {
            store: Mutex::new(store),
            backend,
        }
    }

    pub fn open(backend: LedgerBackend, path: &Path) -> Result<Self, LedgerError> {
        let store: Box<dyn LedgerStore> = match backend {
            LedgerBackend::Json => Box::new(JsonFileStore::new(path)),
            LedgerBackend::Sqlite => Box::new(SqliteStore::open(path)?),
        };
        tracing::info!(backend = store.backend(), path = %path.display(), "ledger opened");
        Ok(Self::new(store))
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Record `name` as present today (local time). Returns `true` if this is
    /// the first record for `name` today, `false` if one already exists.
    pub fn record(&self, name: &str) -> Result<bool, LedgerError> {
        self.record_at(name, Local::now().naive_local())
    }

    /// [`record`](Self::record) with an explicit clock.
    pub fn record_at(&self, name: &str, now: NaiveDateTime) -> Result<bool, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidName(name.to_string()));
        }
        let record = AttendanceRecord::new(name, now);

        let mut store = self.store.lock();
        if store.contains(name, record.date)? {
            return Ok(false);
        }
        match store.append(&record) {
            Ok(()) => {
                tracing::info!(name, date = %record.date, "attendance recorded");
                Ok(true)
            }
            // Another writer got there first.
            Err(LedgerError::Duplicate { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.store.lock().load_all()
    }

    pub fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.date == date)
            .collect())
    }
}
