//! Raw statements: `dbbox query` and `dbbox exec`

use anyhow::{Context, Result};
use clap::Parser;
use dbbox_core::DataSource;

use super::{parse_param, print_rows, rows_to_json};

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// SQL statement returning rows, with driver placeholders (`?` or `$1`)
    pub sql: String,

    /// Parameters bound in order (null, true/false and numbers are typed)
    pub params: Vec<String>,

    /// Print rows as a JSON array
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Data-modifying SQL statement
    pub sql: String,

    /// Parameters bound in order (null, true/false and numbers are typed)
    pub params: Vec<String>,
}

pub async fn run_query(source: &DataSource, args: QueryArgs) -> Result<()> {
    let params = args.params.iter().map(|p| parse_param(p)).collect();
    let result = source
        .query(args.sql, params)
        .await
        .context("Query failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows_to_json(&result))?);
    } else {
        print_rows(&result);
    }
    Ok(())
}

pub async fn run_exec(source: &DataSource, args: ExecArgs) -> Result<()> {
    let params = args.params.iter().map(|p| parse_param(p)).collect();
    let affected = source
        .update(args.sql, params)
        .await
        .context("Statement failed")?;
    println!("{affected} row(s) affected");
    Ok(())
}
