//! Clinic ledger: a dual-tier record store.
//!
//! Records live in a remote database when it is reachable and in local
//! sheet files when it is not. Every operation tries the remote tier first
//! and falls back to the file tier.

pub mod config;
pub mod error;
pub mod init;
pub mod query;
pub mod record;
pub mod request;
pub mod store;
pub mod table;

pub use config::{Config, RemoteConfig};
pub use error::{Error, Result};
pub use query::{parse_criteria, Criteria, FieldFilter, MatchOp};
pub use record::{generate_id, Record, ID_FIELD};
pub use request::{Operation, Request, Response};
pub use store::{
    PushOptions, PushStats, RemoteStatus, RemoteTier, RestRemote, Store, Table, TierUnavailable,
};
pub use table::{TableSpec, BUILTIN_TABLES};
