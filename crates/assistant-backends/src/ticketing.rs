//! Ticketing API Client
//!
//! Basic-auth GET against a fixed table endpoint of a ServiceNow-style REST
//! API. There is no catalog to introspect; the base URL and endpoint stand in
//! for a schema.

use std::time::Duration;

use reqwest::Url;
use serde_json::{Map, Value};

use crate::error::{BackendError, Result};
use crate::format::{self, NO_RESULTS};
use crate::model::TicketingProfile;

/// Resource queried by `execute_api_call`
pub const DEFAULT_ENDPOINT: &str = "/api/now/table/problem";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shape of the `result` member of a response
#[derive(Clone, Debug, PartialEq)]
pub enum ApiResult {
    Rows(Vec<Map<String, Value>>),
    Record(Value),
    Empty,
}

impl ApiResult {
    fn from_body(body: Value) -> Self {
        match body {
            Value::Object(mut map) => match map.remove("result") {
                Some(Value::Array(items)) if items.is_empty() => Self::Empty,
                Some(Value::Array(items)) => Self::Rows(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(record) => record,
                            other => Map::from_iter([("value".to_string(), other)]),
                        })
                        .collect(),
                ),
                Some(Value::Null) | None => Self::Empty,
                Some(record) => Self::Record(record),
            },
            _ => Self::Empty,
        }
    }

    /// Table for a list, pretty JSON for a single record
    pub fn render(&self) -> String {
        match self {
            Self::Rows(rows) => format::records_table(rows),
            Self::Record(record) => {
                serde_json::to_string_pretty(record).unwrap_or_else(|_| record.to_string())
            }
            Self::Empty => NO_RESULTS.into(),
        }
    }
}

pub struct TicketingClient {
    http: reqwest::Client,
    base_url: Url,
    endpoint_url: Url,
    username: String,
    password: String,
}

impl TicketingClient {
    /// Build a client; only the URL is checked, no request is made
    pub fn new(profile: &TicketingProfile) -> Result<Self> {
        let base_url = Url::parse(profile.base_url.trim()).map_err(|e| {
            BackendError::Connection(format!("Invalid ticketing base URL {}: {e}", profile.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BackendError::Connection(format!(
                "Unsupported URL scheme for ticketing API: {}",
                base_url.scheme()
            )));
        }

        let endpoint_url = Url::parse(&format!(
            "{}/{}",
            base_url.as_str().trim_end_matches('/'),
            DEFAULT_ENDPOINT.trim_start_matches('/')
        ))
        .map_err(|e| BackendError::Connection(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(profile.accept_invalid_certs)
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            endpoint_url,
            username: profile.username.clone(),
            password: profile.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn endpoint(&self) -> &str {
        DEFAULT_ENDPOINT
    }

    /// GET the default endpoint with `params` as the query string
    pub async fn query(&self, params: &Map<String, Value>) -> Result<ApiResult> {
        let pairs: Vec<(&str, String)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), query_value(v)))
            .collect();

        tracing::debug!(url = %self.endpoint_url, params = pairs.len(), "Ticketing API call");

        let body: Value = self
            .http
            .get(self.endpoint_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&pairs)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ApiResult::from_body(body))
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
