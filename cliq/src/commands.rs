//! Command implementations.

use std::io::{self, BufRead, Write};

use ledger::{
    init, parse_criteria, Config, Error, PushOptions, Record, RemoteStatus, Request, Response,
    Store, ID_FIELD,
};
use serde_json::Value;
use tracing::debug;

/// Widest a table cell is allowed to get.
const MAX_CELL: usize = 32;

fn open_store() -> ledger::Result<Store> {
    let config = Config::load()?;
    Store::open(config)
}

/// Config as stored on disk, without environment overrides.
fn load_saved_config() -> ledger::Result<Config> {
    let root = Config::default_location()?.ledger_root;
    Config::load_from(&root)
}

pub fn init() -> ledger::Result<()> {
    let config = Config::default_location()?;

    if init::is_initialized(&config) {
        println!("Ledger already initialized at {}", config.ledger_root.display());
        return Ok(());
    }

    init::initialize(&config)?;
    println!("Ledger initialized at {}", config.ledger_root.display());
    println!("Data directory: {}", config.data_dir().display());

    Ok(())
}

pub fn tables() -> ledger::Result<()> {
    let config = Config::load()?;

    println!("{:<14} {:<20} {:<10} SEARCH FIELDS", "TABLE", "FILE", "DATE");
    println!("{}", "-".repeat(70));

    for name in config.table_names() {
        let spec = config.table_spec(&name)?;
        let search = if spec.search_fields.is_empty() {
            "(any field)".to_string()
        } else {
            spec.search_fields.join(", ")
        };
        println!(
            "{:<14} {:<20} {:<10} {}",
            name,
            spec.file_name(),
            spec.date_field.as_deref().unwrap_or("-"),
            search
        );
    }

    Ok(())
}

pub fn list(table: &str, today: bool, format: &str) -> ledger::Result<()> {
    let store = open_store()?;
    let table = store.table(table)?;

    let records = if today { table.today()? } else { table.list()? };
    print_records(&records, format)
}

pub fn get(table: &str, id: &str, format: &str) -> ledger::Result<()> {
    let store = open_store()?;
    let record = store
        .table(table)?
        .get(id)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;

    print_records(std::slice::from_ref(&record), format)
}

pub fn add(table: &str, fields: &[String]) -> ledger::Result<()> {
    let record = parse_fields(fields)?;
    let store = open_store()?;

    let added = store.table(table)?.add(record)?;
    println!("{}", added.id().unwrap_or_default());

    Ok(())
}

pub fn update(table: &str, id: &str, fields: &[String]) -> ledger::Result<()> {
    let changes = parse_fields(fields)?;
    let store = open_store()?;

    let updated = store
        .table(table)?
        .update(id, &changes)?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&updated)?);

    Ok(())
}

pub fn delete(table: &str, id: &str) -> ledger::Result<()> {
    let store = open_store()?;

    if !store.table(table)?.delete(id)? {
        return Err(Error::NotFound(id.to_string()));
    }
    println!("Deleted {}", id);

    Ok(())
}

pub fn search(table: &str, query: &str, format: &str) -> ledger::Result<()> {
    let store = open_store()?;
    let criteria = parse_criteria(query);
    debug!(criteria = %criteria, "searching");

    let records = store.table(table)?.search(&criteria)?;
    print_records(&records, format)
}

pub fn remote_status() -> ledger::Result<()> {
    let config = Config::load()?;
    let remote = config.remote.clone();

    let Some((endpoint, key)) = remote.credentials() else {
        println!("No remote configured.");
        println!("Records are stored in {}", config.data_dir().display());
        return Ok(());
    };

    println!("Endpoint: {}", endpoint);
    println!("Key:      {}", mask(key));
    println!("Timeout:  {}s", remote.timeout().as_secs());

    let store = Store::open(config)?;
    let status = store.remote_status();
    println!("Status:   {}", status);

    if let RemoteStatus::Unreachable(_) = status {
        println!("Operations will fall back to local files.");
    }

    Ok(())
}

pub fn remote_set(endpoint: Option<&str>, key: Option<&str>, timeout: Option<u64>) -> ledger::Result<()> {
    let mut config = load_saved_config()?;

    if endpoint.is_none() && key.is_none() && timeout.is_none() {
        return Err(Error::Config(
            "nothing to set; use --endpoint, --key or --timeout".to_string(),
        ));
    }

    if let Some(endpoint) = endpoint {
        config.remote.endpoint = Some(endpoint.to_string());
    }
    if let Some(key) = key {
        config.remote.key = Some(key.to_string());
    }
    if let Some(timeout) = timeout {
        config.remote.timeout_secs = timeout;
    }

    config.save()?;
    if config.remote.is_configured() {
        println!("Remote configured.");
    } else {
        println!("Remote saved; set both --endpoint and --key to enable it.");
    }

    Ok(())
}

pub fn remote_clear() -> ledger::Result<()> {
    let mut config = load_saved_config()?;
    config.remote.endpoint = None;
    config.remote.key = None;
    config.save()?;

    println!("Remote removed. Records will be stored in local files.");
    Ok(())
}

pub fn push(table: &str, dry_run: bool) -> ledger::Result<()> {
    let store = open_store()?;
    let stats = store.table(table)?.push_local(&PushOptions { dry_run })?;

    if dry_run {
        println!("Would push: {}", stats);
    } else {
        println!("Pushed: {}", stats);
    }

    Ok(())
}

/// Answer one JSON request per stdin line with one JSON response per line.
pub fn serve() -> ledger::Result<()> {
    let store = open_store()?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => store.handle(&request),
            Err(e) => Response::Failed {
                error: format!("invalid request: {}", e),
            },
        };

        serde_json::to_writer(&mut stdout, &response)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }

    Ok(())
}

// Helpers

/// Build a record from `field=value` arguments.
fn parse_fields(fields: &[String]) -> ledger::Result<Record> {
    let mut record = Record::new();
    for arg in fields {
        let (field, value) = parse_assignment(arg)?;
        record.insert(field, value);
    }
    Ok(record)
}

/// Split `field=value`. The value is JSON if it parses as JSON, text otherwise.
fn parse_assignment(arg: &str) -> ledger::Result<(String, Value)> {
    let (field, raw) = arg
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("expected field=value, got '{}'", arg)))?;

    let field = field.trim();
    if field.is_empty() {
        return Err(Error::Config(format!("missing field name in '{}'", arg)));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), value))
}

fn print_records(records: &[Record], format: &str) -> ledger::Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
        "table" => {
            if records.is_empty() {
                println!("No records.");
                return Ok(());
            }

            let columns = columns(records);
            let rows: Vec<Vec<String>> = records
                .iter()
                .map(|r| {
                    columns
                        .iter()
                        .map(|c| r.get(c).map(cell_text).unwrap_or_default())
                        .collect()
                })
                .collect();

            let widths: Vec<usize> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    rows.iter()
                        .map(|row| row[i].chars().count())
                        .chain([c.chars().count()])
                        .max()
                        .unwrap_or(0)
                        .min(MAX_CELL)
                })
                .collect();

            let header: Vec<String> = columns.iter().map(|c| c.to_uppercase()).collect();
            println!("{}", format_row(&header, &widths));
            println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len()));
            for row in &rows {
                println!("{}", format_row(row, &widths));
            }
            println!();
            println!("{} record(s)", records.len());
        }
        other => {
            return Err(Error::Config(format!(
                "unknown format '{}' (expected table or json)",
                other
            )));
        }
    }

    Ok(())
}

/// Every field present in any record, id first, then first-seen order.
fn columns(records: &[Record]) -> Vec<String> {
    let mut columns = vec![ID_FIELD.to_string()];
    for record in records {
        for field in record.fields() {
            if !columns.contains(field) {
                columns.push(field.clone());
            }
        }
    }
    columns
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", truncate(cell, width), width = width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    if key.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
