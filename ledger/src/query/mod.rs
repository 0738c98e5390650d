//! Search criteria and their parser.
//!
//! # Syntax Overview
//!
//! A search is a whitespace-separated list of tokens:
//!
//! - **Equality**: `field=value` matches when the field's text is exactly `value`
//! - **Substring**: `field~value` matches when the field contains `value`,
//!   ignoring case
//! - **Free text**: any other word; all such words are joined into one term
//!   matched (ignoring case) against the table's search fields
//!
//! Every filter and the term must match.

mod matching;
mod parser;

pub use parser::{parse_criteria, Criteria, FieldFilter, MatchOp};
