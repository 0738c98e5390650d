//! File tier: one sheet file per table.
//!
//! Every mutation loads the whole sheet, changes it in memory and writes the
//! whole sheet back. There is no locking; concurrent writers race and the
//! last rename wins.

use std::path::{Path, PathBuf};

use super::sheet::Sheet;
use crate::query::Criteria;
use crate::record::Record;
use crate::table::TableSpec;
use crate::{Error, Result};

/// File-backed access to one table.
#[derive(Debug, Clone)]
pub struct FileTier {
    name: String,
    path: PathBuf,
    search_fields: Vec<String>,
    date_field: Option<String>,
}

impl FileTier {
    /// File tier for `spec`, stored at `path`.
    pub fn new(path: impl Into<PathBuf>, spec: &TableSpec) -> Self {
        Self {
            name: spec.name.clone(),
            path: path.into(),
            search_fields: spec.search_fields.clone(),
            date_field: spec.date_field.clone(),
        }
    }

    /// Path of the sheet file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Sheet> {
        Sheet::load_or_create(&self.path, &self.name)
    }

    /// All records in file order.
    pub fn list(&self) -> Result<Vec<Record>> {
        Ok(self.load()?.records())
    }

    /// Records whose date field is exactly `date`.
    pub fn today(&self, date: &str) -> Result<Vec<Record>> {
        let field = self.date_field.as_deref().ok_or_else(|| {
            Error::Config(format!("table '{}' has no date field", self.name))
        })?;
        let mut records = self.list()?;
        records.retain(|r| r.text(field).as_deref() == Some(date));
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.list()?.into_iter().find(|r| r.has_id(id)))
    }

    /// Append a record. The record must already carry its identifier.
    pub fn add(&self, record: Record) -> Result<Record> {
        let id = record
            .id()
            .ok_or_else(|| Error::Storage("record has no identifier".to_string()))?
            .to_string();

        let mut sheet = self.load()?;
        let mut records = sheet.records();
        if records.iter().any(|r| r.has_id(&id)) {
            return Err(Error::Storage(format!(
                "duplicate id {} in table '{}'",
                id, self.name
            )));
        }

        let record = record.without_nulls();
        records.push(record.clone());
        sheet.replace_rows(&records);
        sheet.save(&self.path)?;
        Ok(record)
    }

    /// Merge `changes` into the record with `id`.
    ///
    /// Returns `None` (and leaves the file untouched) if no record has that id.
    pub fn update(&self, id: &str, changes: &Record) -> Result<Option<Record>> {
        let mut sheet = self.load()?;
        let mut records = sheet.records();

        let Some(target) = records.iter_mut().find(|r| r.has_id(id)) else {
            return Ok(None);
        };
        target.merge_from(changes);
        target.set_id(id);
        let updated = target.clone().without_nulls();
        *target = updated.clone();

        sheet.replace_rows(&records);
        sheet.save(&self.path)?;
        Ok(Some(updated))
    }

    /// Remove every record with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut sheet = self.load()?;
        let mut records = sheet.records();
        let before = records.len();
        records.retain(|r| !r.has_id(id));

        if records.len() == before {
            return Ok(false);
        }

        sheet.replace_rows(&records);
        sheet.save(&self.path)?;
        Ok(true)
    }

    pub fn search(&self, criteria: &Criteria) -> Result<Vec<Record>> {
        Ok(criteria.filter(self.list()?, &self.search_fields))
    }
}
