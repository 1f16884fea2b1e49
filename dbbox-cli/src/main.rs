//! dbbox CLI - run statements and cached table reads against a configured database
//!
//! Connection settings come from `~/.dbbox/config.toml` (or `--config`), with
//! `.env` files and DBBOX_* environment variables layered on top.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbbox_core::DataSource;
use tracing::warn;

mod commands;
mod config;
mod tracing_setup;

use commands::sql::{ExecArgs, QueryArgs};
use commands::table::{ColumnsArgs, ExistsArgs, FilterArgs, GetArgs, TableCommand};

#[derive(Parser, Debug)]
#[command(
    name = "dbbox",
    author,
    version,
    about = "Pooled, retrying SQL access with a per-table row cache",
    long_about = "Run SQL statements through a bounded, retrying connection pool and read \
                  rows through the table cache. Supports MySQL, PostgreSQL and SQLite."
)]
struct Cli {
    /// Path to the config file (default: ~/.dbbox/config.toml)
    #[arg(long, short = 'c', global = true, env = "DBBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a statement that returns rows
    Query(QueryArgs),
    /// Run a data-modifying statement and report affected rows
    Exec(ExecArgs),
    /// Read one column of one row through the table cache
    Get(GetArgs),
    /// Check whether a row with the given identifier exists
    Exists(ExistsArgs),
    /// List identifiers of rows whose column equals a value
    Filter(FilterArgs),
    /// Show the columns discovered for a table
    Columns(ColumnsArgs),
}

async fn run(source: &DataSource, command: Commands) -> Result<()> {
    match command {
        Commands::Query(args) => commands::run_query(source, args).await,
        Commands::Exec(args) => commands::run_exec(source, args).await,
        Commands::Get(args) => commands::run_table(source, TableCommand::Get(args)).await,
        Commands::Exists(args) => commands::run_table(source, TableCommand::Exists(args)).await,
        Commands::Filter(args) => commands::run_table(source, TableCommand::Filter(args)).await,
        Commands::Columns(args) => commands::run_table(source, TableCommand::Columns(args)).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    let config = config::load(cli.config)?;
    let source = DataSource::connect(config)
        .await
        .context("Failed to connect to the database")?;

    let outcome = run(&source, cli.command).await;

    if let Err(err) = source.shutdown().await {
        warn!(error = %err, "error while closing connections");
    }
    outcome
}
