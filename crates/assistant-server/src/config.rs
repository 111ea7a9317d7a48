//! Server Configuration
//!
//! Everything is read from the environment (after `.env` is loaded).

use std::path::PathBuf;

use assistant_backends::{BackendKind, ConnectionProfile, PostgresProfile, TicketingProfile};
use assistant_core::{AssistantError, OrchestratorConfig, Result};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SQLITE_PATH: &str = "data/chinook.db";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Pre-configured connection profiles, one per backend
#[derive(Clone, Debug)]
pub struct EnvProfiles {
    pub sqlite_path: PathBuf,
    pub postgres: PostgresProfile,
    pub ticketing: TicketingProfile,
}

impl EnvProfiles {
    pub fn profile(&self, kind: BackendKind) -> ConnectionProfile {
        match kind {
            BackendKind::Sqlite => ConnectionProfile::sqlite(&self.sqlite_path),
            BackendKind::Postgres => ConnectionProfile::Postgres(self.postgres.clone()),
            BackendKind::Ticketing => ConnectionProfile::Ticketing(self.ticketing.clone()),
        }
    }

    /// A profile is usable only when every credential field is set
    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.profile(kind).validate().is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub profiles: EnvProfiles,
    pub orchestrator: OrchestratorConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let text = |name: &str| var(name).unwrap_or_default();

        let postgres = PostgresProfile {
            host: text("POSTGRES_HOST"),
            port: parse_or(var("POSTGRES_PORT"), "POSTGRES_PORT", 5432)?,
            database: text("POSTGRES_DATABASE"),
            user: text("POSTGRES_USER"),
            password: text("POSTGRES_PASSWORD"),
            schema: var("POSTGRES_SCHEMA"),
        };

        let ticketing = TicketingProfile {
            base_url: text("TICKETING_BASE_URL"),
            username: text("TICKETING_USER"),
            password: text("TICKETING_PASSWORD"),
            instance_name: var("TICKETING_INSTANCE_NAME"),
            accept_invalid_certs: false,
        };

        let mut orchestrator = OrchestratorConfig {
            max_round_trips: parse_or(var("ASSISTANT_MAX_ROUND_TRIPS"), "ASSISTANT_MAX_ROUND_TRIPS", 8)?,
            ..OrchestratorConfig::default()
        };
        if orchestrator.max_round_trips == 0 {
            return Err(AssistantError::Config(
                "ASSISTANT_MAX_ROUND_TRIPS must be at least 1".into(),
            ));
        }
        orchestrator.generation.model = var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            profiles: EnvProfiles {
                sqlite_path: var("SQLITE_DB_PATH").map_or_else(|| DEFAULT_SQLITE_PATH.into(), PathBuf::from),
                postgres,
                ticketing,
            },
            orchestrator,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> Result<T> {
    value.map_or(Ok(default), |v| {
        v.parse()
            .map_err(|_| AssistantError::Config(format!("{name} has an invalid value: {v}")))
    })
}
