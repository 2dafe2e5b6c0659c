//! Storage backend trait for the ledger.

use crate::record::AttendanceRecord;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("{name} already recorded on {date}")]
    Duplicate { name: String, date: NaiveDate },
    #[error("ledger file {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid stored record: {0}")]
    InvalidRow(String),
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Persistent record storage. Each `append` is one atomic commit: after a
/// crash the store holds either the old records or the old records plus the
/// new one.
pub trait LedgerStore: Send {
    /// All records in insertion order.
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError>;

    fn contains(&self, name: &str, date: NaiveDate) -> Result<bool, LedgerError>;

    /// Persist one record. Returns [`LedgerError::Duplicate`] if the store
    /// already holds `(record.name, record.date)`.
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError>;

    /// Short backend name for status output.
    fn backend(&self) -> &'static str;
}
