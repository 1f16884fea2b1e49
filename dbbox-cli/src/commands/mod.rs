//! Command implementations for the dbbox CLI

pub mod sql;
pub mod table;

pub use sql::{run_exec, run_query};
pub use table::run_table;

use dbbox_core::{ResultSet, Value};
use serde_json::{json, Map, Number};

/// Turn a command-line argument into a bound parameter.
///
/// `null`, booleans, integers and decimals are recognized; anything else is
/// sent as text.
pub fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Long(n);
    }
    if let Ok(d) = raw.parse::<f64>() {
        if d.is_finite() {
            return Value::Double(d);
        }
    }
    Value::Text(raw.to_string())
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Long(l) => json!(l),
        Value::Float(f) => Number::from_f64(f64::from(*f)).map_or(serde_json::Value::Null, Into::into),
        Value::Double(d) => Number::from_f64(*d).map_or(serde_json::Value::Null, Into::into),
        Value::Text(s) => json!(s),
        Value::Bytes(b) => json!(b),
    }
}

/// Render rows as a JSON array of objects keyed by column name
pub fn rows_to_json(result: &ResultSet) -> serde_json::Value {
    let rows = result
        .rows()
        .iter()
        .map(|row| {
            let object: Map<String, serde_json::Value> = result
                .columns()
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), to_json(value)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(rows)
}

pub fn values_to_json(values: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(values.iter().map(to_json).collect())
}

/// Tab-separated header and rows
pub fn print_rows(result: &ResultSet) {
    let header: Vec<&str> = result.columns().iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in result.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("{}", cells.join("\t"));
    }
}
