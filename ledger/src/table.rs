//! Per-table configuration.
//!
//! A [`TableSpec`] tells the store where a table lives in each tier and which
//! fields carry meaning for it: the date field used by `today` and remote
//! ordering, the fields a free-text search looks at, and how local field names
//! map onto remote column names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{Record, ID_FIELD};

/// Tables every installation knows about without configuration.
pub const BUILTIN_TABLES: &[&str] = &["labs", "patients", "prescriptions", "medicines", "opticals"];

/// Storage description of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name. Taken from the config key, never serialized.
    #[serde(skip)]
    pub name: String,

    /// File name under the data directory (default: `<name>.json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Remote collection name (default: the table name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Field holding the record's `YYYY-MM-DD` date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,

    /// Fields matched by a free-text search term.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_fields: Vec<String>,

    /// Local field name -> remote column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_map: BTreeMap<String, String>,
}

impl TableSpec {
    /// A spec with every option at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            collection: None,
            date_field: None,
            search_fields: Vec::new(),
            field_map: BTreeMap::new(),
        }
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn with_search_fields(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_field_map(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.field_map.insert(local.into(), remote.into());
        self
    }

    /// Built-in spec for one of the clinic tables.
    pub fn builtin(name: &str) -> Option<Self> {
        let spec = match name {
            "labs" => Self::named(name)
                .with_date_field("date")
                .with_search_fields(&["patientName", "testName"])
                .with_field_map("patientName", "patient_name")
                .with_field_map("testName", "test_name"),
            "patients" => Self::named(name)
                .with_date_field("date")
                .with_search_fields(&["name", "phone"]),
            "prescriptions" => Self::named(name)
                .with_date_field("date")
                .with_search_fields(&["patientName", "phone"])
                .with_field_map("patientName", "patient_name"),
            "medicines" => Self::named(name).with_search_fields(&["name", "company"]),
            "opticals" => Self::named(name)
                .with_date_field("date")
                .with_search_fields(&["patientName", "phone"])
                .with_field_map("patientName", "patient_name"),
            _ => return None,
        };
        Some(spec)
    }

    /// File name of this table's sheet.
    pub fn file_name(&self) -> String {
        match &self.file {
            Some(file) => file.clone(),
            None => format!("{}.json", sanitize_for_filename(&self.name)),
        }
    }

    /// Remote collection holding this table.
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.name)
    }

    /// Remote column name for a local field.
    pub fn remote_field<'a>(&'a self, local: &'a str) -> &'a str {
        self.field_map.get(local).map(String::as_str).unwrap_or(local)
    }

    /// Local field name for a remote column.
    pub fn local_field<'a>(&'a self, remote: &'a str) -> &'a str {
        self.field_map
            .iter()
            .find(|(_, r)| r.as_str() == remote)
            .map(|(l, _)| l.as_str())
            .unwrap_or(remote)
    }

    /// Rename a record's fields for the remote tier.
    ///
    /// The identifier is never renamed.
    pub fn to_remote(&self, record: &Record) -> Record {
        rename_fields(record, |f| match f {
            ID_FIELD => f.to_string(),
            _ => self.remote_field(f).to_string(),
        })
    }

    /// Rename a record's fields coming back from the remote tier.
    pub fn from_remote(&self, record: &Record) -> Record {
        rename_fields(record, |f| match f {
            ID_FIELD => f.to_string(),
            _ => self.local_field(f).to_string(),
        })
    }
}

fn rename_fields(record: &Record, rename: impl Fn(&str) -> String) -> Record {
    let mut out = Record::new();
    for (field, value) in record.iter() {
        out.insert(rename(field), value.clone());
    }
    out
}

/// Sanitize a table name for use as a file name.
fn sanitize_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ' ' => '-',
            c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .take(64)
        .collect()
}
