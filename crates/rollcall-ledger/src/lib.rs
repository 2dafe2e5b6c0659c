//! rollcall-ledger: Attendance ledger.
//!
//! At most one record per identity per calendar day. Records live in a
//! pluggable [`LedgerStore`]: a JSON array file rewritten atomically, or an
//! SQLite table with a uniqueness constraint.

pub mod json_file;
pub mod ledger;
pub mod record;
pub mod sqlite;
pub mod store;

pub use json_file::JsonFileStore;
pub use ledger::{AttendanceLedger, LedgerBackend};
pub use record::AttendanceRecord;
pub use sqlite::SqliteStore;
pub use store::{LedgerError, LedgerStore};
