//! Store - dispatches table operations to the remote tier or the file tier.
//!
//! Every operation tries the remote tier first. If the remote is not
//! configured or reports [`TierUnavailable`], the same operation runs against
//! the table's sheet file instead. A call is served by exactly one tier.

pub(crate) mod atomic;
mod file;
mod remote;
mod sheet;


use std::fmt;

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::query::Criteria;
use crate::record::{generate_id, Record};
use crate::table::TableSpec;
use crate::{Config, Error, Result};

pub use file::FileTier;
pub use remote::{RemoteResult, RemoteTier, RestRemote, TierUnavailable, DEFAULT_TIMEOUT};
pub use sheet::Sheet;

/// A ledger store: configuration plus an optional remote tier.
pub struct Store {
    config: Config,
    remote: Option<Box<dyn RemoteTier>>,
}

impl Store {
    /// Open an existing ledger.
    ///
    /// The remote tier is attached only when both the endpoint and the key
    /// are configured.
    pub fn open(config: Config) -> Result<Self> {
        if !config.data_dir().is_dir() {
            return Err(Error::NotInitialized(config.ledger_root.clone()));
        }

        let remote = match config.remote.credentials() {
            Some((endpoint, key)) => {
                let remote = RestRemote::new(endpoint, key, config.remote.timeout())?;
                debug!(endpoint = remote.base_url(), "remote tier configured");
                Some(Box::new(remote) as Box<dyn RemoteTier>)
            }
            None => {
                debug!("no remote tier configured, using files only");
                None
            }
        };

        Ok(Self { config, remote })
    }

    /// Open an existing ledger with a specific remote tier.
    pub fn with_remote(config: Config, remote: Box<dyn RemoteTier>) -> Result<Self> {
        let mut store = Self::file_only(config)?;
        store.remote = Some(remote);
        Ok(store)
    }

    /// Open an existing ledger ignoring any configured remote.
    pub fn file_only(config: Config) -> Result<Self> {
        if !config.data_dir().is_dir() {
            return Err(Error::NotInitialized(config.ledger_root.clone()));
        }
        Ok(Self {
            config,
            remote: None,
        })
    }

    /// Get config reference.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Access one table by name.
    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        let spec = self.config.table_spec(name)?;
        let file = FileTier::new(self.config.table_path(&spec), &spec);
        Ok(Table {
            remote: self.remote.as_deref(),
            spec,
            file,
        })
    }

    /// Names of every table this store knows about.
    pub fn tables(&self) -> Vec<String> {
        self.config.table_names()
    }

    /// Check whether the remote tier answers.
    pub fn remote_status(&self) -> RemoteStatus {
        match &self.remote {
            None => RemoteStatus::NotConfigured,
            Some(remote) => match remote.ping() {
                Ok(()) => RemoteStatus::Reachable,
                Err(e) => RemoteStatus::Unreachable(e.reason),
            },
        }
    }
}

/// Result of probing the remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    NotConfigured,
    Reachable,
    Unreachable(String),
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::NotConfigured => write!(f, "not configured"),
            RemoteStatus::Reachable => write!(f, "reachable"),
            RemoteStatus::Unreachable(reason) => write!(f, "unreachable ({})", reason),
        }
    }
}

/// Statistics from a push operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushStats {
    /// Records in the local file.
    pub local: usize,
    /// Records already present in the remote.
    pub remote: usize,
    /// Records copied (or, on a dry run, that would be copied).
    pub pushed: usize,
}

impl fmt::Display for PushStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} local, {} remote, {} pushed",
            self.local, self.remote, self.pushed
        )
    }
}

/// Options for push operation.
#[derive(Debug, Default, Clone)]
pub struct PushOptions {
    /// Show what would be pushed without actually pushing.
    pub dry_run: bool,
}

/// One table, bound to the store's tiers.
pub struct Table<'s> {
    remote: Option<&'s dyn RemoteTier>,
    spec: TableSpec,
    file: FileTier,
}

impl<'s> Table<'s> {
    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The file tier backing this table.
    pub fn file(&self) -> &FileTier {
        &self.file
    }

    /// Run `remote_op` if a remote is attached; otherwise, or if it reports
    /// the tier unavailable, run `file_op`.
    fn dispatch<T>(
        &self,
        op: &str,
        remote_op: impl FnOnce(&dyn RemoteTier) -> RemoteResult<T>,
        file_op: impl FnOnce(&FileTier) -> Result<T>,
    ) -> Result<T> {
        if let Some(remote) = self.remote {
            match remote_op(remote) {
                Ok(value) => {
                    debug!(table = %self.spec.name, op, "served by remote tier");
                    return Ok(value);
                }
                Err(e) => {
                    info!(table = %self.spec.name, op, reason = %e, "remote tier unavailable, using file");
                }
            }
        }
        let value = file_op(&self.file)?;
        debug!(table = %self.spec.name, op, "served by file tier");
        Ok(value)
    }

    /// All records. Remote order is newest first when the table has a date
    /// field; file order is insertion order.
    pub fn list(&self) -> Result<Vec<Record>> {
        self.dispatch("list", |r| r.list(&self.spec), |f| f.list())
    }

    /// Records dated today, by the local calendar.
    pub fn today(&self) -> Result<Vec<Record>> {
        self.today_on(Local::now().date_naive())
    }

    /// Records whose date field is exactly `date` as `YYYY-MM-DD`.
    pub fn today_on(&self, date: NaiveDate) -> Result<Vec<Record>> {
        if self.spec.date_field.is_none() {
            return Err(Error::Config(format!(
                "table '{}' has no date field",
                self.spec.name
            )));
        }
        let date = date.format("%Y-%m-%d").to_string();
        self.dispatch("today", |r| r.today(&self.spec, &date), |f| f.today(&date))
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        self.dispatch("get", |r| r.get(&self.spec, id), |f| f.get(id))
    }

    /// Add a record under a newly generated identifier.
    pub fn add(&self, record: Record) -> Result<Record> {
        let mut record = record;
        record.set_id(generate_id());
        self.dispatch(
            "add",
            |r| r.insert(&self.spec, &record),
            |f| f.add(record.clone()),
        )
    }

    /// Merge `changes` into the record with `id`.
    ///
    /// `Ok(None)` means no record has that id. Only the file tier can tell;
    /// the remote tier reports success either way.
    pub fn update(&self, id: &str, changes: &Record) -> Result<Option<Record>> {
        self.dispatch(
            "update",
            |r| r.update(&self.spec, id, changes).map(Some),
            |f| f.update(id, changes),
        )
    }

    /// Delete the record with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.dispatch("delete", |r| r.delete(&self.spec, id), |f| f.delete(id))
    }

    pub fn search(&self, criteria: &Criteria) -> Result<Vec<Record>> {
        self.dispatch(
            "search",
            |r| r.search(&self.spec, criteria),
            |f| f.search(criteria),
        )
    }

    /// Copy records that exist only in the local file into the remote.
    ///
    /// Records added while the remote was unreachable live only in the file;
    /// this makes them visible remotely. Records the remote already has are
    /// left alone, so running it twice pushes nothing the second time.
    pub fn push_local(&self, opts: &PushOptions) -> Result<PushStats> {
        let remote = self
            .remote
            .ok_or_else(|| Error::Config("no remote configured".to_string()))?;

        let local = self.file.list()?;
        let remote_records = remote.list(&self.spec)?;

        let missing: Vec<&Record> = local
            .iter()
            .filter(|r| match r.id() {
                Some(id) => !remote_records.iter().any(|rr| rr.has_id(id)),
                None => false,
            })
            .collect();

        let mut stats = PushStats {
            local: local.len(),
            remote: remote_records.len(),
            pushed: 0,
        };

        if opts.dry_run {
            stats.pushed = missing.len();
            return Ok(stats);
        }

        for record in missing {
            remote.insert(&self.spec, record)?;
            stats.pushed += 1;
        }
        info!(table = %self.spec.name, pushed = stats.pushed, "pushed local records");

        Ok(stats)
    }
}
