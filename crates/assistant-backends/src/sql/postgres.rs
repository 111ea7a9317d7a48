//! PostgreSQL Backend
//!
//! Sessions are opened with `default_transaction_read_only` so a statement
//! that slips past the SELECT check still cannot write.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::{ColumnInfo, ForeignKey, NULL_CELL, QueryOutput, SqlBackend};
use crate::error::{BackendError, Result};
use crate::model::{BackendKind, DEFAULT_PG_SCHEMA, PostgresProfile};

const TABLES_SQL: &str = r"
    SELECT tablename::text
    FROM pg_catalog.pg_tables
    WHERE schemaname = $1
    ORDER BY tablename";

const COLUMNS_SQL: &str = r"
    SELECT column_name::text AS column_name,
           data_type::text AS data_type,
           character_maximum_length::int4 AS max_length,
           is_nullable::text AS is_nullable,
           column_default::text AS column_default
    FROM information_schema.columns
    WHERE table_name = $1
      AND table_schema = $2
    ORDER BY ordinal_position";

const FOREIGN_KEYS_SQL: &str = r"
    SELECT c.conname::text AS constraint_name,
           src.relname::text AS table_name,
           a.attname::text AS column_name,
           dst.relname::text AS foreign_table_name,
           af.attname::text AS foreign_column_name
    FROM pg_constraint AS c
    JOIN pg_namespace AS n ON n.oid = c.connamespace
    JOIN pg_class AS src ON src.oid = c.conrelid
    JOIN pg_class AS dst ON dst.oid = c.confrelid
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) AS k(src_attnum, dst_attnum)
    JOIN pg_attribute AS a ON a.attrelid = c.conrelid AND a.attnum = k.src_attnum
    JOIN pg_attribute AS af ON af.attrelid = c.confrelid AND af.attnum = k.dst_attnum
    WHERE c.contype = 'f'
      AND n.nspname = $1
    ORDER BY table_name, constraint_name, k.src_attnum";

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn connect(profile: &PostgresProfile) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&profile.host)
            .port(profile.port)
            .database(&profile.database)
            .username(&profile.user)
            .password(&profile.password)
            .application_name("db-assistant")
            .options([("default_transaction_read_only", "on")]);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                BackendError::Connection(format!("Unable to connect to the PostgreSQL database: {e}"))
            })?;

        tracing::info!(host = %profile.host, database = %profile.database, "Connected to PostgreSQL");

        Ok(Self { pool })
    }
}

fn schema_or_default(namespace: Option<&str>) -> &str {
    namespace.unwrap_or(DEFAULT_PG_SCHEMA)
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn list_tables(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(TABLES_SQL)
            .bind(schema_or_default(namespace))
            .fetch_all(&self.pool)
            .await?;
        Ok(tables)
    }

    async fn list_columns(&self, table: &str, namespace: Option<&str>) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(table)
            .bind(schema_or_default(namespace))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let is_nullable: String = row.try_get("is_nullable")?;
                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    default: row.try_get("column_default")?,
                    max_length: row.try_get("max_length")?,
                })
            })
            .collect()
    }

    async fn list_foreign_keys(&self, namespace: Option<&str>) -> Result<Vec<ForeignKey>> {
        let rows = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(schema_or_default(namespace))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKey {
                    constraint: row.try_get("constraint_name")?,
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    foreign_table: row.try_get("foreign_table_name")?,
                    foreign_column: row.try_get("foreign_column_name")?,
                })
            })
            .collect()
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

/// Render one cell by its column type; unknown types fall back to text
fn render_cell(row: &PgRow, index: usize) -> Result<String> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(NULL_CELL.into());
    }
    let type_name = raw.type_info().name().to_string();

    let text = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index)?.to_string(),
        "INT2" => row.try_get::<i16, _>(index)?.to_string(),
        "INT4" => row.try_get::<i32, _>(index)?.to_string(),
        "INT8" => row.try_get::<i64, _>(index)?.to_string(),
        "FLOAT4" => row.try_get::<f32, _>(index)?.to_string(),
        "FLOAT8" => row.try_get::<f64, _>(index)?.to_string(),
        "NUMERIC" => row.try_get::<Decimal, _>(index)?.to_string(),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
            .to_rfc3339(),
        "TIMESTAMP" => row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string(),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index)?.to_string(),
        "TIME" => row.try_get::<chrono::NaiveTime, _>(index)?.to_string(),
        "UUID" => row.try_get::<uuid::Uuid, _>(index)?.to_string(),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(index)?.to_string(),
        "BYTEA" => format!("<{} bytes>", row.try_get::<Vec<u8>, _>(index)?.len()),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => text,
            Err(_) => format!("<{type_name}>"),
        },
    };
    Ok(text)
}
