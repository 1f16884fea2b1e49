//! Table-level reads through the row cache

use anyhow::{Context, Result};
use clap::{Args, Parser};
use dbbox_core::DataSource;

use super::{parse_param, values_to_json};

/// Table and identifier column shared by every table command
#[derive(Args, Debug)]
pub struct TableRef {
    /// Table name (letters, digits and underscores)
    pub table: String,

    /// Identifier column used as the row key
    pub identifier: String,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub table: TableRef,

    /// Identifier value of the row
    pub key: String,

    /// Column to read
    pub column: String,
}

#[derive(Parser, Debug)]
pub struct ExistsArgs {
    #[command(flatten)]
    pub table: TableRef,

    /// Identifier value of the row
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct FilterArgs {
    #[command(flatten)]
    pub table: TableRef,

    /// Column to compare
    pub column: String,

    /// Value the column must equal
    pub value: String,

    /// Print identifiers as a JSON array
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ColumnsArgs {
    #[command(flatten)]
    pub table: TableRef,
}

/// The table commands, sharing one opening path
#[derive(Debug)]
pub enum TableCommand {
    Get(GetArgs),
    Exists(ExistsArgs),
    Filter(FilterArgs),
    Columns(ColumnsArgs),
}

impl TableCommand {
    fn table_ref(&self) -> &TableRef {
        match self {
            TableCommand::Get(args) => &args.table,
            TableCommand::Exists(args) => &args.table,
            TableCommand::Filter(args) => &args.table,
            TableCommand::Columns(args) => &args.table,
        }
    }
}

pub async fn run_table(source: &DataSource, command: TableCommand) -> Result<()> {
    let TableRef { table, identifier } = command.table_ref();
    let handle = source
        .table(table, identifier)
        .await
        .with_context(|| format!("Failed to open table '{table}'"))?;

    match command {
        TableCommand::Get(args) => {
            let entry = handle
                .get(&args.key, &args.column)
                .await
                .with_context(|| format!("Failed to read {}.{}", args.key, args.column))?;
            println!("{}", entry.value());
        }
        TableCommand::Exists(args) => {
            let found = handle.exists(&args.key).await.context("Lookup failed")?;
            println!("{found}");
        }
        TableCommand::Filter(args) => {
            let ids = handle
                .filter(&args.column, parse_param(&args.value))
                .await
                .context("Filter failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&values_to_json(&ids))?);
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
        TableCommand::Columns(_) => {
            for column in handle.columns() {
                println!(
                    "{}\t{}\t{:?}",
                    column.name(),
                    column.type_name(),
                    column.data_type()
                );
            }
        }
    }
    Ok(())
}
