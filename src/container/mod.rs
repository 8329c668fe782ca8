//! Structured binary containers (MAT-file level 5)
//!
//! Every file the pipeline reads or writes is a level-5 MAT file. `mat` turns
//! such a file into named [`Value`] trees and back; `de` lets callers pull
//! typed structs out of a tree with serde instead of probing fields by hand.

mod de;
pub mod mat;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

pub use de::from_value;
pub use mat::{read_mat, write_mat};

/// Container errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a level-5 MAT file: {0}")]
    InvalidHeader(String),

    #[error("malformed data element: {0}")]
    Malformed(String),

    #[error("unsupported MAT content: {0}")]
    Unsupported(String),

    #[error("variable '{name}' not found in {}", path.display())]
    MissingVariable { path: PathBuf, name: String },

    #[error("{0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ContainerError>;

/// A squeezed MAT value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Logical(bool),
    Text(String),
    Numbers(Vec<f64>),
    Flags(Vec<bool>),
    Record(BTreeMap<String, Value>),
    List(Vec<Value>),
}

impl Value {
    /// Record from `(field, value)` pairs
    pub fn record<K, I>(fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Empty record; written as a struct with no fields
    pub fn empty_record() -> Value {
        Value::Record(BTreeMap::new())
    }

    /// True for empty arrays, lists, records and text
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(_) | Value::Logical(_) => false,
            Value::Text(s) => s.is_empty(),
            Value::Numbers(v) => v.is_empty(),
            Value::Flags(v) => v.is_empty(),
            Value::Record(m) => m.is_empty(),
            Value::List(v) => v.is_empty(),
        }
    }

    /// Field of a record
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Record(m) => m.get(field),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Numbers(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::Flags(v)
    }
}

/// Load one variable from a MAT file and deserialize it
pub fn load_variable<T: DeserializeOwned>(path: &Path, name: &str) -> Result<T> {
    let mut variables = read_mat(path)?;
    let value = variables
        .remove(name)
        .ok_or_else(|| ContainerError::MissingVariable {
            path: path.to_path_buf(),
            name: name.to_string(),
        })?;
    from_value(value)
}

/// Write named variables to a new MAT file, replacing any existing file
pub fn save_variables(path: &Path, variables: &[(&str, &Value)]) -> Result<()> {
    write_mat(path, variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(Value::List(vec![]).is_empty());
        assert!(Value::empty_record().is_empty());
        assert!(!Value::Scalar(f64::NAN).is_empty());
        assert!(!Value::record([("a", Value::from(1.0))]).is_empty());
    }

    #[test]
    fn test_get_field() {
        let value = Value::record([("gender", Value::from("male"))]);
        assert_eq!(value.get("gender"), Some(&Value::Text("male".into())));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Scalar(1.0).get("gender"), None);
    }
}
