//! JSON array file backend.

use crate::record::AttendanceRecord;
use crate::store::{LedgerError, LedgerStore};
use chrono::NaiveDate;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Ledger stored as a single JSON array. Every append rewrites the whole
/// file through a temp file in the same directory, fsync, then rename.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| LedgerError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomic(&self, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LedgerError::Io(e.error))?;

        // Make the rename itself durable.
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
        Ok(())
    }
}

impl LedgerStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.read()
    }

    fn contains(&self, name: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        Ok(self
            .read()?
            .iter()
            .any(|r| r.name == name && r.date == date))
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        let mut records = self.read()?;
        if records
            .iter()
            .any(|r| r.name == record.name && r.date == record.date)
        {
            return Err(LedgerError::Duplicate {
                name: record.name.clone(),
                date: record.date,
            });
        }
        records.push(record.clone());
        self.write_atomic(&records)
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::iso_timestamp;
    use tempfile::TempDir;

    fn rec(name: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord::new(name, iso_timestamp::parse(ts).unwrap())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("attendance.json"));
        assert!(store.load_all().unwrap().is_empty());
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert!(!store.contains("alice", date).unwrap());
    }

    #[test]
    fn test_append_then_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/attendance.json");
        let mut store = JsonFileStore::new(&path);
        store.append(&rec("alice", "2026-10-18T09:00:00")).unwrap();
        store.append(&rec("bob", "2026-10-18T09:01:00")).unwrap();

        let reopened = JsonFileStore::new(&path);
        let names: Vec<_> = reopened.load_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        // No temp files left behind.
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_duplicate_append_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("a.json"));
        store.append(&rec("alice", "2026-10-18T09:00:00")).unwrap();
        let err = store.append(&rec("alice", "2026-10-18T17:00:00")).unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate { .. }));
        store.append(&rec("alice", "2026-10-19T09:00:00")).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        fs::write(
            &path,
            r#"[{"name":"carol","timestamp":"2026-10-17T08:00:00.000000","date":"2026-10-17","source":"manual"}]"#,
        )
        .unwrap();

        let mut store = JsonFileStore::new(&path);
        store.append(&rec("dave", "2026-10-18T08:00:00")).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["source"], "manual");
        assert_eq!(raw[1]["name"], "dave");
    }

    #[test]
    fn test_corrupt_file_is_error_and_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        fs::write(&path, "{not json").unwrap();

        let mut store = JsonFileStore::new(&path);
        assert!(matches!(store.load_all(), Err(LedgerError::Corrupt { .. })));
        assert!(store.append(&rec("erin", "2026-10-18T08:00:00")).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }
}
