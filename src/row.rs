//! The row type handed to consumers of a [`crate::row_stream::RowStream`].

use std::sync::Arc;

use crate::error::{Result, SpannerError};
use crate::value::Value;

/// Column names shared by every row produced from the same query, so that cloning a
/// [`Row`] doesn't re-allocate the column name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMetadata {
    columns: Arc<Vec<String>>,
}

impl RowMetadata {
    pub fn new(columns: Vec<String>) -> Self {
        RowMetadata {
            columns: Arc::new(columns),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// An opaque wrapper over a native row struct, providing typed column access by
/// 1-based ordinal or by name (§3).
#[derive(Debug, Clone)]
pub struct Row {
    metadata: RowMetadata,
    values: Arc<Vec<Value>>,
}

impl Row {
    pub fn new(metadata: RowMetadata, values: Vec<Value>) -> Self {
        Row {
            metadata,
            values: Arc::new(values),
        }
    }

    pub fn metadata(&self) -> &RowMetadata {
        &self.metadata
    }

    /// 1-based ordinal access, mirroring Spanner's column numbering convention.
    pub fn value_at(&self, ordinal: usize) -> Result<&Value> {
        self.values
            .get(ordinal.checked_sub(1).ok_or_else(|| {
                SpannerError::UnknownColumn(format!("ordinal {ordinal} is not 1-based"))
            })?)
            .ok_or_else(|| SpannerError::UnknownColumn(format!("ordinal {ordinal}")))
    }

    pub fn value_by_name(&self, name: &str) -> Result<&Value> {
        let idx = self
            .metadata
            .index_of(name)
            .ok_or_else(|| SpannerError::UnknownColumn(name.to_string()))?;
        self.values
            .get(idx)
            .ok_or_else(|| SpannerError::UnknownColumn(name.to_string()))
    }

    pub fn get_i64(&self, ordinal: usize) -> Result<i64> {
        match self.value_at(ordinal)? {
            Value::Int64(v) => Ok(*v),
            other => Err(column_type_mismatch(ordinal.to_string(), other, "Int64")),
        }
    }

    pub fn get_i64_by_name(&self, name: &str) -> Result<i64> {
        match self.value_by_name(name)? {
            Value::Int64(v) => Ok(*v),
            other => Err(column_type_mismatch(name.to_string(), other, "Int64")),
        }
    }

    pub fn get_string(&self, ordinal: usize) -> Result<String> {
        match self.value_at(ordinal)? {
            Value::String(v) => Ok(v.clone()),
            other => Err(column_type_mismatch(ordinal.to_string(), other, "String")),
        }
    }

    pub fn get_string_by_name(&self, name: &str) -> Result<String> {
        match self.value_by_name(name)? {
            Value::String(v) => Ok(v.clone()),
            other => Err(column_type_mismatch(name.to_string(), other, "String")),
        }
    }

    pub fn get_f64(&self, ordinal: usize) -> Result<f64> {
        match self.value_at(ordinal)? {
            Value::Float64(v) => Ok(*v),
            other => Err(column_type_mismatch(ordinal.to_string(), other, "Float64")),
        }
    }
}

fn column_type_mismatch(column: String, actual: &Value, expected: &str) -> SpannerError {
    SpannerError::ColumnConversion {
        column,
        source: format!("expected {expected}, found {actual:?}").into(),
    }
}
