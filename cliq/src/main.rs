//! cliq: Clinic Query - CLI for the clinic ledger.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cliq")]
#[command(about = "Clinic Query - read and write clinic records, remote first with file fallback")]
#[command(version)]
struct Cli {
    /// Log tier decisions to stderr (same as RUST_LOG=debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a ledger (config and data directory)
    Init,

    /// List known tables and their settings
    Tables,

    /// List records in a table
    #[command(visible_alias = "ls")]
    List {
        /// Table name (e.g., patients, labs)
        table: String,

        /// Only records dated today
        #[arg(short = 't', long = "today")]
        today: bool,

        /// Output format: table, json
        #[arg(short = 'f', long = "format", default_value = "table")]
        format: String,
    },

    /// Show one record by id
    Get {
        table: String,
        id: String,

        /// Output format: table, json
        #[arg(short = 'f', long = "format", default_value = "json")]
        format: String,
    },

    /// Add a record from field=value pairs
    Add {
        table: String,

        /// Fields as field=value (values are read as JSON when they parse, text otherwise)
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Change fields of a record (field=null clears a field)
    Update {
        table: String,
        id: String,

        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Delete a record by id
    #[command(visible_alias = "rm")]
    Delete { table: String, id: String },

    /// Search a table (e.g., `name~smith`, `phone=555-0101`, `smith`)
    #[command(visible_alias = "s")]
    Search {
        table: String,

        /// Search terms
        #[arg(required = true)]
        query: Vec<String>,

        /// Output format: table, json
        #[arg(short = 'f', long = "format", default_value = "table")]
        format: String,
    },

    /// Manage the remote database connection
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },

    /// Copy records that only exist in the local file to the remote
    Push {
        table: String,

        /// Show what would be pushed without pushing
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },

    /// Answer JSON requests from stdin, one per line
    Serve,
}

#[derive(Subcommand)]
enum RemoteAction {
    /// Show remote settings and whether the remote answers
    Status,

    /// Set remote connection options
    Set {
        /// Base URL (e.g., https://project.supabase.co)
        #[arg(short = 'e', long = "endpoint")]
        endpoint: Option<String>,

        /// API key
        #[arg(short = 'k', long = "key")]
        key: Option<String>,

        /// Per-request timeout in seconds
        #[arg(short = 't', long = "timeout")]
        timeout: Option<u64>,
    },

    /// Remove the remote connection (files only)
    Clear,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init(),
        Commands::Tables => commands::tables(),
        Commands::List { table, today, format } => commands::list(&table, today, &format),
        Commands::Get { table, id, format } => commands::get(&table, &id, &format),
        Commands::Add { table, fields } => commands::add(&table, &fields),
        Commands::Update { table, id, fields } => commands::update(&table, &id, &fields),
        Commands::Delete { table, id } => commands::delete(&table, &id),
        Commands::Search { table, query, format } => {
            commands::search(&table, &query.join(" "), &format)
        }
        Commands::Remote { action } => match action {
            RemoteAction::Status => commands::remote_status(),
            RemoteAction::Set { endpoint, key, timeout } => {
                commands::remote_set(endpoint.as_deref(), key.as_deref(), timeout)
            }
            RemoteAction::Clear => commands::remote_clear(),
        },
        Commands::Push { table, dry_run } => commands::push(&table, dry_run),
        Commands::Serve => commands::serve(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
