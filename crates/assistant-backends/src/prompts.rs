//! System Prompts
//!
//! The first turn of every conversation, chosen by the connected backend.

use crate::model::{ConnectionProfile, DEFAULT_PG_SCHEMA};
use crate::ticketing::DEFAULT_ENDPOINT;

const SELF_CORRECTION: &str = "- Answer questions by executing SELECT queries using the `execute_sql_function`.\n\
- If a query execution results in an error, use the `debug_sql_query` function to debug and correct the query.\n\
- After correcting the query, try executing it again using the `execute_sql_function`.";

pub fn system_prompt(profile: &ConnectionProfile) -> String {
    match profile {
        ConnectionProfile::Sqlite { .. } => sqlite_prompt(),
        ConnectionProfile::Postgres(_) => {
            postgres_prompt(profile.namespace().unwrap_or(DEFAULT_PG_SCHEMA))
        }
        ConnectionProfile::Ticketing(t) => ticketing_prompt(t.base_url.trim_end_matches('/')),
    }
}

fn sqlite_prompt() -> String {
    format!(
        "You are a helpful assistant for a SQLite database.\n\
         Only read data; never attempt to modify the database.\n\
         {SELF_CORRECTION}"
    )
}

fn postgres_prompt(schema: &str) -> String {
    format!(
        "You are a helpful assistant for a PostgreSQL database. Whenever any information related to the schema \
         or table or column info is asked, just use the schema provided to you.\n\
         The active schema is '{schema}'.\n\
         If you want tables for a given schema, use queries like this:\n\
         SELECT tablename\n    FROM pg_catalog.pg_tables\n    WHERE schemaname = '{schema}'\n    ORDER BY tablename;\n\
         If column names are asked, this is how the query should look:\n\
         SELECT column_name\n    FROM information_schema.columns\n    WHERE table_name = '<table>'\n    AND table_schema = '{schema}';\n\
         {SELF_CORRECTION}"
    )
}

fn ticketing_prompt(base_url: &str) -> String {
    format!(
        "You are a helpful assistant for querying the ServiceNow API.\n\
         The base API URL is: {base_url}\n\
         The default API endpoint is: {DEFAULT_ENDPOINT}\n\
         When constructing API calls, use this base URL and endpoint, and only specify the necessary query parameters.\n\n\
         Answer user questions by making appropriate API calls using the `execute_api_call` function.\n\
         In the `execute_api_call` function, you only need to specify the 'params' argument with the appropriate \
         'sysparm_query' to fulfill the user's request.\n\n\
         For example, to get information on a problem ticket with number 'PRB000107560', \
         you would call `execute_api_call` with:\n\n\
         params: {{'sysparm_query': 'number=PRB000107560'}}\n\n\
         Do not include the base API URL or endpoint in the function call; they are already configured.\n\
         Ensure that the parameters you provide are correct for the user's request.\n\
         Provide the user with the relevant information extracted from the API response.\n\n\
         Note: Do not include any confidential information in your responses."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PostgresProfile, TicketingProfile};

    #[test]
    fn test_prompts_follow_backend() {
        let sqlite = system_prompt(&ConnectionProfile::sqlite("data/chinook.db"));
        assert!(sqlite.contains("SQLite"));
        assert!(sqlite.contains("debug_sql_query"));

        let pg = system_prompt(&ConnectionProfile::Postgres(PostgresProfile {
            host: "h".into(),
            port: 5432,
            database: "d".into(),
            user: "u".into(),
            password: "p".into(),
            schema: Some("sales".into()),
        }));
        assert!(pg.contains("WHERE schemaname = 'sales'"));

        let api = system_prompt(&ConnectionProfile::Ticketing(TicketingProfile {
            base_url: "https://dev.example.com/".into(),
            username: "u".into(),
            password: "p".into(),
            instance_name: None,
            accept_invalid_certs: false,
        }));
        assert!(api.contains("The base API URL is: https://dev.example.com\n"));
        assert!(api.contains("/api/now/table/problem"));
        assert!(api.contains("{'sysparm_query': 'number=PRB000107560'}"));
        assert!(!api.contains("execute_sql_function"));
    }
}
