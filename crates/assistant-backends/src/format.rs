//! Result Formatting
//!
//! Renders query and API results as the text fed back to the model.

use comfy_table::{Table, presets::ASCII_MARKDOWN};
use serde_json::{Map, Value};

/// Returned instead of an empty table
pub const NO_RESULTS: &str = "No results found.";

/// Render a Markdown table; an empty row set yields [`NO_RESULTS`]
pub fn markdown_table<H, R>(headers: H, rows: R) -> String
where
    H: IntoIterator,
    H::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: IntoIterator,
    <R::Item as IntoIterator>::Item: AsRef<str>,
{
    let mut table = Table::new();
    table.load_preset(ASCII_MARKDOWN);
    table.set_header(headers.into_iter().map(|h| sanitize(h.as_ref())));

    let mut count = 0usize;
    for row in rows {
        table.add_row(row.into_iter().map(|c| sanitize(c.as_ref())));
        count += 1;
    }

    if count == 0 {
        return NO_RESULTS.into();
    }
    table.to_string()
}

/// Table over JSON records; headers come from the first record's keys
pub fn records_table(records: &[Map<String, Value>]) -> String {
    let Some(first) = records.first() else {
        return NO_RESULTS.into();
    };
    let headers: Vec<&String> = first.keys().collect();

    let rows = records.iter().map(|record| {
        headers
            .iter()
            .map(|h| record.get(h.as_str()).map_or_else(String::new, json_cell))
            .collect::<Vec<_>>()
    });

    markdown_table(headers.iter().map(|h| h.as_str()), rows)
}

/// Flatten one JSON value into a table cell
///
/// Reference objects (`{"link": ..., "value": ...}`) collapse to their value.
pub fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) if map.contains_key("link") => {
            map.get("value").map_or_else(String::new, json_cell)
        }
        other => other.to_string(),
    }
}

fn sanitize(cell: &str) -> String {
    cell.replace(['\r', '\n'], " ").replace('|', "\\|")
}
