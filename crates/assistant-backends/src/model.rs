//! Domain Model
//!
//! Backend identities and the connection profiles bound to them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Result};

/// Namespace used when a PostgreSQL profile does not name one
pub const DEFAULT_PG_SCHEMA: &str = "public";

/// Which kind of data source is connected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Embedded default store
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    /// Ticketing REST API
    #[serde(alias = "servicenow")]
    Ticketing,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Ticketing => "ticketing",
        }
    }

    /// Parse a user-supplied identity, accepting the common aliases
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "ticketing" | "servicenow" => Some(Self::Ticketing),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PostgreSQL credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresProfile {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Namespace to introspect (defaults to `public`)
    #[serde(default)]
    pub schema: Option<String>,
}

const fn default_pg_port() -> u16 {
    5432
}

impl std::fmt::Debug for PostgresProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Ticketing API credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketingProfile {
    /// Instance URL, e.g. `https://example.service-now.com`
    pub base_url: String,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub instance_name: Option<String>,
    /// Accept self-signed certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for TicketingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketingProfile")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("instance_name", &self.instance_name)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Credentials bound to a backend identity; replaced wholesale on reconnect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ConnectionProfile {
    Sqlite {
        path: PathBuf,
    },
    #[serde(alias = "postgresql")]
    Postgres(PostgresProfile),
    #[serde(alias = "servicenow")]
    Ticketing(TicketingProfile),
}

impl ConnectionProfile {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::Sqlite { path: path.into() }
    }

    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite { .. } => BackendKind::Sqlite,
            Self::Postgres(_) => BackendKind::Postgres,
            Self::Ticketing(_) => BackendKind::Ticketing,
        }
    }

    /// Namespace filter for introspection (PostgreSQL only)
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Postgres(pg) => Some(
                pg.schema
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_PG_SCHEMA),
            ),
            _ => None,
        }
    }

    /// Short human-readable name of the connected source
    pub fn display_name(&self) -> String {
        match self {
            Self::Sqlite { path } => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Postgres(pg) => pg.database.clone(),
            Self::Ticketing(t) => t
                .instance_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "ServiceNow".into()),
        }
    }

    /// Reject profiles with empty credential fields before any network call
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = match self {
            Self::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    vec!["path"]
                } else {
                    vec![]
                }
            }
            Self::Postgres(pg) => [
                ("host", pg.host.as_str()),
                ("database", pg.database.as_str()),
                ("user", pg.user.as_str()),
                ("password", pg.password.as_str()),
            ]
            .into_iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k)
            .collect(),
            Self::Ticketing(t) => [
                ("base_url", t.base_url.as_str()),
                ("username", t.username.as_str()),
                ("password", t.password.as_str()),
            ]
            .into_iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k)
            .collect(),
        };

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackendError::InvalidProfile(format!(
                "incomplete credentials for {}: missing {}",
                self.kind(),
                missing.join(", ")
            )))
        }
    }
}
