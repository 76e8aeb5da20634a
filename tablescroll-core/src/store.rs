//! The durable, append-only result store.
//!
//! On disk the store is a UTF-8, two-space indented JSON array of records.
//! Records are only ever appended; a record with an empty Audience ID is
//! always appended because it cannot be deduplicated.

use crate::extract::ExtractedRecord;
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tablescroll_common::{Result, ScrollError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Where a run's records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRef {
    /// First run: create a timestamp-named file in this directory.
    Fresh { dir: PathBuf },
    /// Continue an earlier run's file.
    Existing(PathBuf),
}

impl StoreRef {
    pub fn from_settings(settings: &tablescroll_config::StoreSettings) -> Self {
        match &settings.path {
            Some(path) => Self::Existing(path.clone()),
            None => Self::Fresh {
                dir: settings.dir.clone(),
            },
        }
    }

    /// Concrete file path. Fresh references get `audience_data_<YYYYMMDD_HHMMSS>.json`.
    pub fn resolve(&self) -> PathBuf {
        match self {
            Self::Existing(path) => path.clone(),
            Self::Fresh { dir } => dir.join(format!(
                "audience_data_{}.json",
                Local::now().format("%Y%m%d_%H%M%S")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub written: usize,
    pub skipped_duplicate: usize,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    records: Vec<ExtractedRecord>,
    keys: HashSet<String>,
}

impl ResultStore {
    /// Load the store at `path`, or start an empty one if it does not exist.
    ///
    /// An existing file that cannot be read back is a corruption error; it is
    /// never replaced by an empty store.
    pub fn load_or_new(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| ScrollError::StoreCorruption {
            path: path.to_path_buf(),
            reason,
        };

        let records: Vec<ExtractedRecord> = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                let value: Value =
                    serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;
                let Value::Array(entries) = value else {
                    return Err(corrupt("top level is not a list".to_string()));
                };
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, entry)| match entry {
                        Value::Object(map) => Ok(ExtractedRecord::from_stored(map)),
                        _ => Err(corrupt(format!("entry {i} is not an object"))),
                    })
                    .collect::<Result<_>>()?
            }
        } else {
            info!(path = %path.display(), "store.new");
            Vec::new()
        };

        let keys = records
            .iter()
            .map(|r| r.audience_id.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        debug!(path = %path.display(), records = records.len(), "store.loaded");
        Ok(Self {
            path: path.to_path_buf(),
            records,
            keys,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, audience_id: &str) -> bool {
        self.keys.contains(audience_id.trim())
    }

    /// Append records whose key is new; duplicates within `incoming` count as
    /// skipped too.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = ExtractedRecord>) -> MergeReport {
        let mut report = MergeReport::default();
        for record in incoming {
            let key = record.audience_id.trim();
            if !key.is_empty() && !self.keys.insert(key.to_string()) {
                report.skipped_duplicate += 1;
                continue;
            }
            self.records.push(record);
            report.written += 1;
        }
        report
    }

    /// Atomically replace the file with the current records.
    pub fn save(&self) -> Result<()> {
        let store_err = |e: &dyn std::fmt::Display| {
            ScrollError::Store(format!("{}: {e}", self.path.display()))
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| store_err(&e))?;

        let body = serde_json::to_string_pretty(&self.records).map_err(|e| store_err(&e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| store_err(&e))?;
        tmp.write_all(body.as_bytes()).map_err(|e| store_err(&e))?;
        tmp.as_file().sync_all().map_err(|e| store_err(&e))?;
        tmp.persist(&self.path).map_err(|e| store_err(&e.error))?;

        debug!(path = %self.path.display(), records = self.records.len(), "store.saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, id: &str) -> ExtractedRecord {
        ExtractedRecord {
            name: name.into(),
            audience_id: id.into(),
            ..ExtractedRecord::default()
        }
    }

    #[test]
    fn fresh_reference_gets_timestamped_name() {
        let path = StoreRef::Fresh { dir: PathBuf::from("out") }.resolve();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(path.starts_with("out"));
        assert!(name.starts_with("audience_data_") && name.ends_with(".json"));
        assert_eq!(name.len(), "audience_data_20250101_120000.json".len());
    }

    #[test]
    fn merge_skips_known_and_intra_batch_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ResultStore::load_or_new(&tmp.path().join("s.json")).unwrap();
        let first = store.merge([rec("A", "1"), rec("B", "2"), rec("B again", "2")]);
        assert_eq!(first, MergeReport { written: 2, skipped_duplicate: 1 });
        let second = store.merge([rec("A", " 1 "), rec("C", "3")]);
        assert_eq!(second, MergeReport { written: 1, skipped_duplicate: 1 });
        let names: Vec<_> = store.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn keyless_records_are_always_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ResultStore::load_or_new(&tmp.path().join("s.json")).unwrap();
        let report = store.merge([rec("x", ""), rec("x", "  ")]);
        assert_eq!(report.written, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn save_then_load_preserves_order_and_unicode() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("s.json");
        let mut store = ResultStore::load_or_new(&path).unwrap();
        store.merge([rec("Zoë's café", "9"), rec("B", "1")]);
        store.save().unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Zoë's café"));
        assert!(raw.contains("\n  {\n    \"Name\""));

        let reloaded = ResultStore::load_or_new(&path).unwrap();
        assert_eq!(reloaded.records(), store.records());
        assert!(reloaded.contains("9"));
    }

    #[test]
    fn empty_file_is_an_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.json");
        fs::write(&path, "\n").unwrap();
        assert!(ResultStore::load_or_new(&path).unwrap().is_empty());
    }

    #[test]
    fn unreadable_store_is_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.json");
        fs::write(&path, "[{\"Name\": ").unwrap();
        let err = ResultStore::load_or_new(&path).unwrap_err();
        assert!(matches!(err, ScrollError::StoreCorruption { .. }));
        assert!(!err.is_retryable());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"Name\": ");
    }

    #[test]
    fn nulls_and_numbers_in_a_stored_row_are_read_as_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.json");
        fs::write(
            &path,
            r#"[{"Name": "A", "Type": null, "Availability": "Ready",
                "Date created": "Jan 5, 2024", "Audience ID": 23857669590730523,
                "Owner": {"team": "growth"}}]"#,
        )
        .unwrap();

        let store = ResultStore::load_or_new(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("23857669590730523"));
        let row = &store.records()[0];
        assert_eq!(row.name, "A");
        assert_eq!(row.kind, "");
        assert_eq!(row.extra["Owner"], serde_json::json!({"team": "growth"}));
    }

    #[test]
    fn store_that_is_not_a_list_of_objects_is_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        for body in [r#"{"Name": "A"}"#, "[1]", r#"[{"Name": "A"}, "B"]"#] {
            let path = tmp.path().join("s.json");
            fs::write(&path, body).unwrap();
            let err = ResultStore::load_or_new(&path).unwrap_err();
            assert!(
                matches!(err, ScrollError::StoreCorruption { .. }),
                "{body}: {err}"
            );
        }
    }
}
