//! Schema Catalog
//!
//! Turns a live connection into the schema description handed to the model.
//! Built once per connect and never refreshed mid-conversation.

use serde::Serialize;

use crate::connection::BackendConnection;
use crate::error::{BackendError, Result};
use crate::model::BackendKind;
use crate::sql::{ColumnInfo, ForeignKey, SqlBackend};
use crate::ticketing::TicketingClient;

pub const FK_SUMMARY_HEADER: &str = "=== Foreign Key Relationships Summary ===";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaCatalog {
    Relational {
        kind: BackendKind,
        namespace: Option<String>,
        tables: Vec<TableInfo>,
        foreign_keys: Vec<ForeignKey>,
    },
    /// REST backends have no catalog; the endpoint is the schema
    Api { base_url: String, endpoint: String },
}

impl SchemaCatalog {
    /// Introspect `connection`; every failure is reported as an introspection error
    pub async fn build(connection: &BackendConnection, namespace: Option<&str>) -> Result<Self> {
        let catalog = match connection {
            BackendConnection::Sql(sql) => Self::build_relational(sql.as_ref(), namespace)
                .await
                .map_err(|e| match e {
                    BackendError::Introspection(_) => e,
                    other => BackendError::Introspection(other.to_string()),
                })?,
            BackendConnection::Ticketing(client) => Self::for_api(client),
        };

        tracing::info!(
            backend = %connection.kind(),
            tables = catalog.table_count(),
            "Schema catalog built"
        );
        Ok(catalog)
    }

    async fn build_relational(sql: &dyn SqlBackend, namespace: Option<&str>) -> Result<Self> {
        let names = sql.list_tables(namespace).await?;
        let foreign_keys = sql.list_foreign_keys(namespace).await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = sql.list_columns(&name, namespace).await?;
            tables.push(TableInfo { name, columns });
        }

        Ok(Self::Relational {
            kind: sql.kind(),
            namespace: namespace.map(str::to_string),
            tables,
            foreign_keys,
        })
    }

    pub fn for_api(client: &TicketingClient) -> Self {
        Self::Api {
            base_url: client.base_url().to_string(),
            endpoint: client.endpoint().to_string(),
        }
    }

    pub fn table_count(&self) -> usize {
        match self {
            Self::Relational { tables, .. } => tables.len(),
            Self::Api { .. } => 0,
        }
    }

    /// Render the text description
    pub fn describe(&self) -> String {
        match self {
            Self::Api { base_url, endpoint } => {
                format!("API Base URL: {base_url}\nDefault Endpoint: {endpoint}")
            }
            Self::Relational {
                namespace,
                tables,
                foreign_keys,
                ..
            } => {
                let mut sections: Vec<String> = tables
                    .iter()
                    .map(|table| describe_table(table, namespace.as_deref(), foreign_keys))
                    .collect();

                if !foreign_keys.is_empty() {
                    let mut summary = vec![FK_SUMMARY_HEADER.to_string()];
                    summary.extend(foreign_keys.iter().map(|fk| {
                        format!(
                            "{}.{} -> {}.{}",
                            fk.table, fk.column, fk.foreign_table, fk.foreign_column
                        )
                    }));
                    sections.push(summary.join("\n"));
                }

                sections.join("\n\n")
            }
        }
    }
}

fn describe_table(table: &TableInfo, namespace: Option<&str>, foreign_keys: &[ForeignKey]) -> String {
    let mut lines = Vec::new();
    if let Some(ns) = namespace {
        lines.push(format!("Schema: {ns}"));
    }
    lines.push(format!("Table: {}", table.name));
    lines.push("Columns:".into());
    lines.extend(table.columns.iter().map(|c| format!("  {}", describe_column(c))));

    let keys: Vec<&ForeignKey> = foreign_keys.iter().filter(|fk| fk.table == table.name).collect();
    if !keys.is_empty() {
        lines.push("Foreign Keys:".into());
        lines.extend(keys.iter().map(|fk| {
            format!(
                "  {} -> {}.{} (Constraint: {})",
                fk.column, fk.foreign_table, fk.foreign_column, fk.constraint
            )
        }));
    }

    lines.join("\n")
}

fn describe_column(column: &ColumnInfo) -> String {
    let mut detail = format!(
        "Nullable: {}, Default: {}",
        if column.nullable { "YES" } else { "NO" },
        column.default.as_deref().unwrap_or("NULL")
    );
    if let Some(len) = column.max_length {
        detail.push_str(&format!(", Max Length: {len}"));
    }
    format!("{} {} ({detail})", column.name, column.data_type)
}
