//! Backend Tools
//!
//! The closed set of tools the model may call. Which ones are declared
//! depends on the connected backend:
//!
//! | backend            | tools                                      |
//! |--------------------|--------------------------------------------|
//! | sqlite, postgres   | `execute_sql_function`, `debug_sql_query`  |
//! | ticketing          | `execute_api_call`                         |
//!
//! Arguments arrive as loose JSON and are parsed into typed structs before
//! anything runs.

mod api_call;
mod debug_sql;
mod execute_sql;
mod toolbox;

pub use api_call::execute_api_call;
pub use debug_sql::{correction_prompt, debug_sql_query};
pub use execute_sql::{ONLY_SELECT_MESSAGE, execute_sql, is_read_only};
pub use toolbox::Toolbox;

#[cfg(test)]
pub(crate) use execute_sql::tests::CountingBackend;

use assistant_core::{ParameterSchema, ToolCall, ToolSchema};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::BackendKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    ExecuteSql,
    DebugSql,
    ApiCall,
}

impl ToolName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecuteSql => "execute_sql_function",
            Self::DebugSql => "debug_sql_query",
            Self::ApiCall => "execute_api_call",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "execute_sql_function" => Some(Self::ExecuteSql),
            "debug_sql_query" => Some(Self::DebugSql),
            "execute_api_call" => Some(Self::ApiCall),
            _ => None,
        }
    }

    /// Tools declared for a backend
    pub const fn for_backend(kind: BackendKind) -> &'static [Self] {
        match kind {
            BackendKind::Sqlite | BackendKind::Postgres => &[Self::ExecuteSql, Self::DebugSql],
            BackendKind::Ticketing => &[Self::ApiCall],
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ExecuteSqlArgs {
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DebugSqlArgs {
    pub query: String,
    pub error_message: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApiCallArgs {
    pub params: Map<String, Value>,
}

/// A tool call with validated arguments
#[derive(Clone, Debug, PartialEq)]
pub enum BackendTool {
    ExecuteSql(ExecuteSqlArgs),
    DebugSql(DebugSqlArgs),
    ApiCall(ApiCallArgs),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolParseError {
    #[error("Tool {0} is not available for this backend")]
    Undeclared(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: ToolName, reason: String },
}

impl BackendTool {
    /// Resolve a raw call against the tools declared for `kind`
    pub fn parse(call: &ToolCall, kind: BackendKind) -> Result<Self, ToolParseError> {
        let name = ToolName::parse(&call.name)
            .filter(|name| ToolName::for_backend(kind).contains(name))
            .ok_or_else(|| ToolParseError::Undeclared(call.name.clone()))?;

        let tool = match name {
            ToolName::ExecuteSql => Self::ExecuteSql(typed_args(name, &call.arguments)?),
            ToolName::DebugSql => Self::DebugSql(typed_args(name, &call.arguments)?),
            ToolName::ApiCall => Self::ApiCall(typed_args(name, &call.arguments)?),
        };
        Ok(tool)
    }

    pub const fn name(&self) -> ToolName {
        match self {
            Self::ExecuteSql(_) => ToolName::ExecuteSql,
            Self::DebugSql(_) => ToolName::DebugSql,
            Self::ApiCall(_) => ToolName::ApiCall,
        }
    }
}

fn typed_args<T: DeserializeOwned>(
    tool: ToolName,
    arguments: &Map<String, Value>,
) -> Result<T, ToolParseError> {
    serde_json::from_value(Value::Object(arguments.clone())).map_err(|e| {
        ToolParseError::InvalidArguments {
            tool,
            reason: e.to_string(),
        }
    })
}

/// Declarations sent to the model; the schema text is embedded in the
/// `query` argument of `execute_sql_function`
pub fn declarations(kind: BackendKind, schema_description: &str) -> Vec<ToolSchema> {
    ToolName::for_backend(kind)
        .iter()
        .map(|name| declaration(*name, schema_description))
        .collect()
}

fn declaration(name: ToolName, schema_description: &str) -> ToolSchema {
    match name {
        ToolName::ExecuteSql => ToolSchema {
            name: name.to_string(),
            description: "Use this function to answer user questions by executing SQL queries.".into(),
            parameters: vec![ParameterSchema::required(
                "query",
                "string",
                format!(
                    "SQL query that extracts the information to answer the user's question.\n\
                     SQL should be written using this database schema:\n\
                     {schema_description}\n\
                     The SQL query should be correct and not modify the database."
                ),
            )],
        },
        ToolName::DebugSql => ToolSchema {
            name: name.to_string(),
            description: "Use this function to fix SQL queries that resulted in errors.".into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "The original SQL query that failed."),
                ParameterSchema::required(
                    "error_message",
                    "string",
                    "The error message returned when the query was executed.",
                ),
            ],
        },
        ToolName::ApiCall => ToolSchema {
            name: name.to_string(),
            description: "Use this function to answer user questions by making API calls to the \
                          ticketing system. Come up with a sysparm_query for the question asked."
                .into(),
            parameters: vec![ParameterSchema::required(
                "params",
                "object",
                "Query parameters to include in the request, \
                 e.g., {'sysparm_query': 'number=PRB000107560'}.",
            )],
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new("call_1", name, args.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_declared_set_follows_backend() {
        let sql: Vec<String> = declarations(BackendKind::Sqlite, "").into_iter().map(|d| d.name).collect();
        assert_eq!(sql, vec!["execute_sql_function", "debug_sql_query"]);

        let api: Vec<String> = declarations(BackendKind::Ticketing, "").into_iter().map(|d| d.name).collect();
        assert_eq!(api, vec!["execute_api_call"]);
    }

    #[test]
    fn test_schema_is_embedded_in_query_description() {
        let decls = declarations(BackendKind::Postgres, "Table: customer");
        let params = decls[0].parameters_json();
        let description = params["properties"]["query"]["description"].as_str().unwrap();
        assert!(description.contains("Table: customer"));
        assert_eq!(decls[1].parameters_json()["required"], json!(["query", "error_message"]));
    }

    #[test]
    fn test_parse_typed_arguments() {
        let tool = BackendTool::parse(
            &call("debug_sql_query", json!({"query": "SELEC 1", "error_message": "syntax error"})),
            BackendKind::Sqlite,
        )
        .unwrap();
        assert_eq!(
            tool,
            BackendTool::DebugSql(DebugSqlArgs {
                query: "SELEC 1".into(),
                error_message: "syntax error".into(),
            })
        );
    }

    #[test]
    fn test_tool_from_other_backend_is_undeclared() {
        let err = BackendTool::parse(
            &call("execute_api_call", json!({"params": {}})),
            BackendKind::Postgres,
        )
        .unwrap_err();
        assert_eq!(err, ToolParseError::Undeclared("execute_api_call".into()));

        let err = BackendTool::parse(&call("drop_table", json!({})), BackendKind::Sqlite).unwrap_err();
        assert!(matches!(err, ToolParseError::Undeclared(_)));
    }

    #[test]
    fn test_shape_mismatch_is_invalid() {
        let err = BackendTool::parse(
            &call("execute_sql_function", json!({"query": 42})),
            BackendKind::Sqlite,
        )
        .unwrap_err();
        assert!(matches!(err, ToolParseError::InvalidArguments { tool: ToolName::ExecuteSql, .. }));

        let err = BackendTool::parse(
            &call("execute_api_call", json!({"params": "sysparm_query=active=true"})),
            BackendKind::Ticketing,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for execute_api_call"));
    }
}
