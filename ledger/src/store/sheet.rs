//! On-disk layout of a table file.
//!
//! A table is stored as a single sheet: a header row of column names followed
//! by positional rows. The header is the union of every field ever written to
//! the table, in first-seen order; columns are appended as new fields appear
//! and are never removed.
//!
//! ```json
//! {"sheet": "patients", "columns": ["id", "name"], "rows": [["0190...", "A"]]}
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::atomic;
use crate::record::Record;
use crate::{Error, Result};

/// A table as it lives on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Table name.
    pub sheet: String,
    /// Header row.
    pub columns: Vec<String>,
    /// Rows aligned to `columns`; a blank cell is `null`.
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    /// An empty sheet with no columns.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            sheet: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a sheet holding exactly these records.
    pub fn from_records(name: impl Into<String>, records: &[Record]) -> Self {
        let mut sheet = Self::empty(name);
        sheet.replace_rows(records);
        sheet
    }

    /// Decode every row into a record. Blank cells are omitted.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                for (column, cell) in self.columns.iter().zip(row) {
                    if !cell.is_null() {
                        record.insert(column.clone(), cell.clone());
                    }
                }
                record
            })
            .collect()
    }

    /// Replace all rows, extending the header with any unseen fields.
    pub fn replace_rows(&mut self, records: &[Record]) {
        for record in records {
            for field in record.fields() {
                if !self.columns.contains(field) {
                    self.columns.push(field.clone());
                }
            }
        }

        self.rows = records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a sheet, creating an empty one on disk if the file is absent.
    ///
    /// The parent directory must already exist.
    pub fn load_or_create(path: &Path, name: &str) -> Result<Self> {
        if !path.exists() {
            let sheet = Self::empty(name);
            sheet.save(path)?;
            return Ok(sheet);
        }

        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::empty(name));
        }

        let sheet: Sheet = serde_json::from_str(&contents).map_err(|e| Error::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        sheet.validate(path)?;
        Ok(sheet)
    }

    /// Write the whole sheet to `path`, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        atomic::replace_file(path, &contents)?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let malformed = |reason: String| Error::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        for (i, column) in self.columns.iter().enumerate() {
            if column.is_empty() {
                return Err(malformed(format!("column {} has an empty name", i)));
            }
            if self.columns[..i].contains(column) {
                return Err(malformed(format!("duplicate column '{}'", column)));
            }
        }

        for (i, row) in self.rows.iter().enumerate() {
            if row.len() > self.columns.len() {
                return Err(malformed(format!(
                    "row {} has {} cells but the header has {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn rec(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_header_is_union_in_first_seen_order() {
        let sheet = Sheet::from_records(
            "labs",
            &[
                rec(json!({"id": "1", "name": "A"})),
                rec(json!({"id": "2", "date": "2024-01-15"})),
            ],
        );

        assert_eq!(sheet.columns, vec!["id", "name", "date"]);
        assert_eq!(sheet.rows[0], vec![json!("1"), json!("A"), Value::Null]);
        assert_eq!(sheet.rows[1], vec![json!("2"), Value::Null, json!("2024-01-15")]);
    }

    #[test]
    fn test_columns_survive_row_removal() {
        let mut sheet = Sheet::from_records("labs", &[rec(json!({"id": "1", "extra": 1}))]);
        sheet.replace_rows(&[rec(json!({"id": "2"}))]);

        assert_eq!(sheet.columns, vec!["extra", "id"]);
        assert_eq!(sheet.rows, vec![vec![Value::Null, json!("2")]]);
    }

    #[test]
    fn test_records_omit_blank_cells() {
        let sheet = Sheet {
            sheet: "labs".to_string(),
            columns: vec!["id".to_string(), "name".to_string(), "note".to_string()],
            rows: vec![vec![json!("1"), json!("A")]],
        };
        let records = sheet.records();
        assert_eq!(records, vec![rec(json!({"id": "1", "name": "A"}))]);
    }

    #[test]
    fn test_round_trip_many_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patients.json");

        let records: Vec<Record> = (0..25)
            .map(|i| {
                rec(json!({
                    "id": format!("id-{}", i),
                    "name": format!("Patient {}", i),
                    "age": i,
                    "insured": i % 2 == 0,
                    "visits": [i, i + 1],
                }))
            })
            .collect();

        Sheet::from_records("patients", &records).save(&path).unwrap();
        let loaded = Sheet::load_or_create(&path, "patients").unwrap();

        assert_eq!(loaded.len(), 25);
        assert_eq!(loaded.records(), records);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("opticals.json");

        let sheet = Sheet::load_or_create(&path, "opticals").unwrap();

        assert!(sheet.is_empty());
        assert!(path.exists());
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"sheet": "opticals", "columns": [], "rows": []}));
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join("labs.json");

        let result = Sheet::load_or_create(&path, "labs");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_blank_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labs.json");
        fs::write(&path, "\n").unwrap();

        assert!(Sheet::load_or_create(&path, "labs").unwrap().is_empty());
    }

    #[test]
    fn test_load_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("labs.json");

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Sheet::load_or_create(&path, "labs"),
            Err(Error::Malformed { .. })
        ));

        fs::write(&path, r#"{"sheet":"labs","columns":["id"],"rows":[["1","extra"]]}"#).unwrap();
        assert!(matches!(
            Sheet::load_or_create(&path, "labs"),
            Err(Error::Malformed { .. })
        ));

        fs::write(&path, r#"{"sheet":"labs","columns":["id","id"],"rows":[]}"#).unwrap();
        assert!(matches!(
            Sheet::load_or_create(&path, "labs"),
            Err(Error::Malformed { .. })
        ));

        fs::write(&path, r#"{"sheet":"labs","columns":["id"],"rows":[{"id":"1"}]}"#).unwrap();
        assert!(matches!(
            Sheet::load_or_create(&path, "labs"),
            Err(Error::Malformed { .. })
        ));
    }
}
