//! SQL Backends
//!
//! Read-only adapters over the relational engines the assistant can query.

mod postgres;
mod sqlite;

pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

#[cfg(test)]
pub(crate) use sqlite::tests::seed_music_db;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::BackendKind;

/// One column as reported by the engine's catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-native type name
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    /// Character maximum length (PostgreSQL only)
    pub max_length: Option<i32>,
}

/// A single `table.column -> table.column` edge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constraint: String,
    pub table: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// Rows of a query, every cell already rendered to text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rendered in place of SQL `NULL`
pub const NULL_CELL: &str = "NULL";

/// Relational backend (Strategy pattern)
///
/// Implemented for SQLite and PostgreSQL. `namespace` is the schema filter
/// and is ignored by engines without schemas.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// User tables, excluding engine-internal ones, sorted by name
    async fn list_tables(&self, namespace: Option<&str>) -> Result<Vec<String>>;

    /// Columns of `table` in declaration order
    async fn list_columns(&self, table: &str, namespace: Option<&str>) -> Result<Vec<ColumnInfo>>;

    /// Every foreign-key edge in the namespace, sorted by table then constraint
    async fn list_foreign_keys(&self, namespace: Option<&str>) -> Result<Vec<ForeignKey>>;

    /// Run a statement and collect its rows
    async fn fetch(&self, sql: &str) -> Result<QueryOutput>;

    /// Release pooled connections
    async fn close(&self);
}
