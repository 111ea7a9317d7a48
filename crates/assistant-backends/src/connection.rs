//! Backend Connection
//!
//! A live handle for whichever backend a profile names.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{BackendKind, ConnectionProfile};
use crate::sql::{PostgresBackend, SqlBackend, SqliteBackend};
use crate::ticketing::TicketingClient;

#[derive(Clone)]
pub enum BackendConnection {
    Sql(Arc<dyn SqlBackend>),
    Ticketing(Arc<TicketingClient>),
}

impl BackendConnection {
    /// Open a connection for `profile`
    ///
    /// Relational backends are contacted immediately; the ticketing client
    /// only validates its URL.
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        profile.validate()?;

        let connection = match profile {
            ConnectionProfile::Sqlite { path } => {
                Self::Sql(Arc::new(SqliteBackend::connect(path).await?))
            }
            ConnectionProfile::Postgres(pg) => {
                Self::Sql(Arc::new(PostgresBackend::connect(pg).await?))
            }
            ConnectionProfile::Ticketing(t) => Self::Ticketing(Arc::new(TicketingClient::new(t)?)),
        };
        Ok(connection)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sql(sql) => sql.kind(),
            Self::Ticketing(_) => BackendKind::Ticketing,
        }
    }

    pub async fn close(&self) {
        if let Self::Sql(sql) = self {
            sql.close().await;
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendConnection").field(&self.kind()).finish()
    }
}
