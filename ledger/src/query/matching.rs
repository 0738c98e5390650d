//! In-memory evaluation of search criteria.

use crate::record::{value_text, Record};

use super::parser::{Criteria, FieldFilter, MatchOp};

impl FieldFilter {
    /// Does this filter accept the record?
    ///
    /// A field with no text form (absent, null, nested) never matches, the
    /// same way a SQL NULL fails both `=` and `ILIKE`.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(text) = record.text(&self.field) else {
            return false;
        };
        match self.op {
            MatchOp::Eq => text == self.value,
            MatchOp::Contains => contains_ignore_case(&text, &self.value),
        }
    }
}

impl Criteria {
    /// Does the record satisfy every filter and the free-text term?
    ///
    /// `search_fields` are the fields the term is matched against; when empty
    /// the term may match any field.
    pub fn matches(&self, record: &Record, search_fields: &[String]) -> bool {
        if !self.filters.iter().all(|f| f.matches(record)) {
            return false;
        }

        let term = match self.term.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return true,
        };

        if search_fields.is_empty() {
            record
                .iter()
                .filter_map(|(_, v)| value_text(v))
                .any(|text| contains_ignore_case(&text, term))
        } else {
            search_fields
                .iter()
                .filter_map(|f| record.text(f))
                .any(|text| contains_ignore_case(&text, term))
        }
    }

    /// Keep the records these criteria accept, preserving order.
    pub fn filter(&self, records: Vec<Record>, search_fields: &[String]) -> Vec<Record> {
        records
            .into_iter()
            .filter(|r| self.matches(r, search_fields))
            .collect()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
