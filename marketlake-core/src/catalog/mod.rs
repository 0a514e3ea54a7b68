//! Metadata catalog abstraction.
//!
//! The transform stage registers its outputs here so downstream query
//! engines can discover them. Registration is idempotent by contract:
//! upserting an existing table updates it in place, and adding a partition
//! that already exists is a no-op, never an error.

pub mod json;

pub use json::JsonCatalog;

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog i/o error: {0}")]
    Io(String),

    #[error("catalog serialization error: {0}")]
    Serde(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

/// One column of a registered table, with a Hive-style type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
}

/// A table descriptor to register: schema, physical location, and the
/// partition key list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub location: String,
    pub partition_keys: Vec<String>,
}

impl TableSpec {
    /// Derive a spec from the frame actually written.
    pub fn from_frame(
        name: impl Into<String>,
        df: &DataFrame,
        location: impl Into<String>,
        partition_keys: &[&str],
    ) -> Self {
        let columns = df
            .schema()
            .iter()
            .map(|(name, dtype)| ColumnSpec {
                name: name.to_string(),
                type_name: hive_type_name(dtype),
            })
            .collect();

        Self {
            name: name.into(),
            columns,
            location: location.into(),
            partition_keys: partition_keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

fn hive_type_name(dtype: &DataType) -> String {
    match dtype {
        DataType::Float64 | DataType::Float32 => "double".to_string(),
        DataType::Int64 | DataType::UInt64 | DataType::UInt32 => "bigint".to_string(),
        DataType::Int32 | DataType::Int16 | DataType::Int8 => "int".to_string(),
        DataType::String => "string".to_string(),
        DataType::Date => "date".to_string(),
        DataType::Boolean => "boolean".to_string(),
        other => format!("{other}").to_lowercase(),
    }
}

/// A partition registered under a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub values: Vec<String>,
    pub location: String,
}

/// Stored form of a table: the spec plus its registered partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub spec: TableSpec,
    pub partitions: Vec<PartitionEntry>,
}

/// Result of a partition registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionAdd {
    Created,
    AlreadyExists,
}

pub trait Catalog: Send + Sync {
    /// Create the table or update it in place. Registered partitions of an
    /// existing table are preserved.
    fn upsert_table(&self, spec: &TableSpec) -> Result<(), CatalogError>;

    /// Register one partition. Re-registering an existing `values`
    /// combination is a no-op.
    fn add_partition(
        &self,
        table: &str,
        values: &[String],
        location: &str,
    ) -> Result<PartitionAdd, CatalogError>;

    fn get_table(&self, name: &str) -> Result<Option<TableDescriptor>, CatalogError>;
}
