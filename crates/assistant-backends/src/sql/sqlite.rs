//! SQLite Backend
//!
//! The embedded default store. The file is opened read-only and must exist.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::{ColumnInfo, ForeignKey, NULL_CELL, QueryOutput, SqlBackend};
use crate::error::{BackendError, Result};
use crate::model::BackendKind;

pub struct SqliteBackend {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteBackend {
    pub async fn connect(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BackendError::Connection(format!(
                "SQLite database file not found at {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| BackendError::Connection(format!("Failed to open SQLite database: {e}")))?;

        tracing::info!(path = %path.display(), "Opened SQLite database");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn primary_key(&self, table: &str) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk LIMIT 1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn list_tables(&self, _namespace: Option<&str>) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn list_columns(&self, table: &str, _namespace: Option<&str>) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\", dflt_value FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: row.try_get::<i64, _>("notnull")? == 0,
                    default: row.try_get("dflt_value")?,
                    max_length: None,
                })
            })
            .collect()
    }

    async fn list_foreign_keys(&self, namespace: Option<&str>) -> Result<Vec<ForeignKey>> {
        let mut keys = Vec::new();

        for table in self.list_tables(namespace).await? {
            let rows = sqlx::query(
                "SELECT id, \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
            )
            .bind(&table)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let id: i64 = row.try_get("id")?;
                let foreign_table: String = row.try_get("table")?;
                let column: String = row.try_get("from")?;
                // `to` is NULL when the reference targets the parent's primary key
                let foreign_column = match row.try_get::<Option<String>, _>("to")? {
                    Some(c) => c,
                    None => self
                        .primary_key(&foreign_table)
                        .await?
                        .unwrap_or_else(|| "rowid".into()),
                };

                keys.push(ForeignKey {
                    constraint: format!("fk_{table}_{id}"),
                    table: table.clone(),
                    column,
                    foreign_table,
                    foreign_column,
                });
            }
        }

        Ok(keys)
    }

    async fn fetch(&self, sql: &str) -> Result<QueryOutput> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| render_cell(row, i)).collect())
            .collect::<Result<Vec<Vec<String>>>>()?;

        Ok(QueryOutput { columns, rows })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite values are dynamically typed; decode by the storage class of the value
fn render_cell(row: &SqliteRow, index: usize) -> Result<String> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(NULL_CELL.into());
    }
    let storage = raw.type_info().name().to_uppercase();

    let text = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(index)?.to_string(),
        "REAL" => row.try_get_unchecked::<f64, _>(index)?.to_string(),
        "BLOB" => format!("<{} bytes>", row.try_get_unchecked::<Vec<u8>, _>(index)?.len()),
        _ => row.try_get_unchecked::<String, _>(index)?,
    };
    Ok(text)
}
