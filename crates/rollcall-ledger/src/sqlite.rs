//! SQLite backend.

use crate::record::{iso_timestamp, AttendanceRecord};
use crate::store::{LedgerError, LedgerStore};
use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ledger stored in an `attendance` table with `UNIQUE(name, date)`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS attendance (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  timestamp TEXT NOT NULL,
  date TEXT NOT NULL,
  extra TEXT,
  UNIQUE(name, date)
);
"#,
        )?;
        Ok(Self { conn })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(
    (name, timestamp, date, extra): (String, String, String, Option<String>),
) -> Result<AttendanceRecord, LedgerError> {
    let bad = |what: &str, raw: &str| LedgerError::InvalidRow(format!("{name}: {what} {raw:?}"));
    let timestamp = iso_timestamp::parse(&timestamp).map_err(|_| bad("timestamp", &timestamp))?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| bad("date", &date))?;
    let extra = match extra {
        Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)?,
        None => Map::new(),
    };
    Ok(AttendanceRecord {
        name,
        timestamp,
        date,
        extra,
    })
}

impl LedgerStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, timestamp, date, extra FROM attendance ORDER BY id")?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(row?)?);
        }
        Ok(out)
    }

    fn contains(&self, name: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM attendance WHERE name = ?1 AND date = ?2",
                params![name, date.format(DATE_FORMAT).to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        let extra = if record.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.extra)?)
        };

        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO attendance (name, timestamp, date, extra) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.name,
                record.timestamp.format(iso_timestamp::FORMAT).to_string(),
                record.date.format(DATE_FORMAT).to_string(),
                extra,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(LedgerError::Duplicate {
                    name: record.name.clone(),
                    date: record.date,
                });
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
