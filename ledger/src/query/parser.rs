//! Parser for search criteria.

use serde::{Deserialize, Serialize};

/// Parsed search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    /// Field filters, all of which must match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FieldFilter>,
    /// Free-text term matched against the table's search fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

/// Filter on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: MatchOp,
    pub value: String,
}

/// How a field filter compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOp {
    /// `=` exact equality
    Eq,
    /// `~` case-insensitive substring
    Contains,
}

impl MatchOp {
    fn symbol(self) -> char {
        match self {
            MatchOp::Eq => '=',
            MatchOp::Contains => '~',
        }
    }
}

/// Parse a search string into criteria.
pub fn parse_criteria(input: &str) -> Criteria {
    let mut criteria = Criteria::default();
    let mut words = Vec::new();

    for token in input.split_whitespace() {
        match try_parse_filter(token) {
            Some(filter) => criteria.filters.push(filter),
            None => words.push(token),
        }
    }

    if !words.is_empty() {
        criteria.term = Some(words.join(" "));
    }

    criteria
}

/// Try to parse `field=value` or `field~value`.
fn try_parse_filter(token: &str) -> Option<FieldFilter> {
    // The first operator character splits field from value
    let (pos, op_char) = token.char_indices().find(|(_, c)| *c == '=' || *c == '~')?;

    let field = &token[..pos];
    if field.is_empty() || !field.chars().all(is_field_char) {
        return None;
    }

    let op = if op_char == '=' { MatchOp::Eq } else { MatchOp::Contains };
    let value = &token[pos + op_char.len_utf8()..];

    Some(FieldFilter {
        field: field.to_string(),
        op,
        value: value.to_string(),
    })
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

impl Criteria {
    /// Criteria matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria with only a free-text term.
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            filters: Vec::new(),
            term: Some(term.into()),
        }
    }

    /// Add an equality filter.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: MatchOp::Eq,
            value: value.into(),
        });
        self
    }

    /// Add a substring filter.
    pub fn contains(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: MatchOp::Contains,
            value: value.into(),
        });
        self
    }

    /// Check if these criteria match everything.
    pub fn is_match_all(&self) -> bool {
        self.filters.is_empty() && self.term.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

impl std::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl std::fmt::Display for Criteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|flt| format!("{}{}{}", flt.field, flt.op, flt.value))
            .collect();
        if let Some(term) = &self.term {
            parts.push(term.clone());
        }
        write!(f, "{}", parts.join(" "))
    }
}
