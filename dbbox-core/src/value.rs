//! Column values and semantic column types

use std::fmt;

/// A single SQL value as carried through parameters, results and cached rows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Text(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) | Value::Long(_) => self.as_i64().map(|i| i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Render a parameter list for diagnostics: `1, alice, NULL`
pub fn render_params(params: &[Value]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Bytes,
}

impl DataType {
    /// Map an engine-reported type name onto a semantic type.
    ///
    /// Names the engine reports that we do not recognize are treated as strings.
    pub fn from_type_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();

        if upper.starts_with("TINYINT(1)") || base.starts_with("BOOL") || base == "BIT" {
            return DataType::Boolean;
        }
        match base {
            "BIGINT" | "INT8" | "BIGSERIAL" => DataType::Long,
            "INT" | "INTEGER" | "INT4" | "SMALLINT" | "INT2" | "TINYINT" | "MEDIUMINT"
            | "SERIAL" => DataType::Int,
            "FLOAT" | "REAL" | "FLOAT4" => DataType::Float,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "DECIMAL" | "NUMERIC" => DataType::Double,
            b if b.contains("BLOB") || b.contains("BINARY") || b == "BYTEA" => DataType::Bytes,
            _ => DataType::String,
        }
    }

    /// Coerce a candidate value to this type so it can be compared with a column value.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            DataType::String => Some(Value::Text(value.to_string())),
            DataType::Int | DataType::Long => value.as_i64().map(Value::Long),
            DataType::Float | DataType::Double => value.as_f64().map(Value::Double),
            DataType::Boolean => value.as_bool().map(Value::Bool),
            DataType::Bytes => match value {
                Value::Bytes(b) => Some(Value::Bytes(b.clone())),
                Value::Text(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_map_to_semantic_types() {
        assert_eq!(DataType::from_type_name("VARCHAR(255)"), DataType::String);
        assert_eq!(DataType::from_type_name("TEXT"), DataType::String);
        assert_eq!(DataType::from_type_name("INT"), DataType::Int);
        assert_eq!(DataType::from_type_name("integer"), DataType::Int);
        assert_eq!(DataType::from_type_name("BIGINT"), DataType::Long);
        assert_eq!(DataType::from_type_name("TINYINT(1)"), DataType::Boolean);
        assert_eq!(DataType::from_type_name("BOOLEAN"), DataType::Boolean);
        assert_eq!(DataType::from_type_name("REAL"), DataType::Float);
        assert_eq!(DataType::from_type_name("DOUBLE"), DataType::Double);
        assert_eq!(DataType::from_type_name("DECIMAL(10,2)"), DataType::Double);
        assert_eq!(DataType::from_type_name("LONGBLOB"), DataType::Bytes);
        assert_eq!(DataType::from_type_name("JSON"), DataType::String);
    }

    #[test]
    fn test_coerce_across_numeric_widths() {
        assert_eq!(DataType::Long.coerce(&Value::Int(3)), Some(Value::Long(3)));
        assert_eq!(DataType::Int.coerce(&Value::from("42")), Some(Value::Long(42)));
        assert_eq!(DataType::Boolean.coerce(&Value::Long(0)), Some(Value::Bool(false)));
        assert_eq!(DataType::Int.coerce(&Value::from("abc")), None);
    }

    #[test]
    fn test_render_params() {
        let params = vec![Value::from(1), Value::from("alice"), Value::Null];
        assert_eq!(render_params(&params), "1, alice, NULL");
        assert_eq!(render_params(&[]), "");
    }
}
