//! Tool execution engine.
//!
//! Routes a model-issued tool call through sanitization, strict schema
//! validation, and the tool's parameterized query, then reduces the row set
//! to the result shape the orchestrator folds back into the transcript.

pub mod catalog;
pub mod sanitize;

pub use catalog::{ToolCatalog, ToolDescriptor, ToolSpec};

use crate::error::AskError;
use crate::state::Database;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Upper bound on argument/result renderings in log events.
const LOG_RENDER_MAX: usize = 500;

/// Execute a tool call against the metrics store.
///
/// Unknown tool and schema violation are fatal to the request by design;
/// neither is auto-corrected here.
///
/// Result shape follows cardinality: exactly one row yields the record
/// itself, zero or many rows yield `{"rows": [...]}`.
pub async fn execute_tool(
    catalog: &ToolCatalog,
    db: &Arc<Mutex<Database>>,
    tool_name: &str,
    raw_args: &Value,
) -> Result<Value, AskError> {
    let spec = catalog
        .get(tool_name)
        .ok_or_else(|| AskError::UnknownTool(tool_name.to_string()))?;

    let clean = sanitize::sanitize_args(&spec.parameters, raw_args);

    let instance = Value::Object(clean.clone());
    catalog
        .validate_args(tool_name, &instance)
        .map_err(|detail| AskError::SchemaViolation {
            tool: tool_name.to_string(),
            detail,
        })?;

    info!(
        tool = tool_name,
        args = %bounded(&instance.to_string()),
        sql_file = %spec.sql_file,
        "executing tool"
    );

    let rows = {
        let db = db.lock().await;
        db.run_tool_query(&spec.sql_text, &clean)?
    };

    let rowcount = rows.len();
    let result = reduce_rows(rows);

    info!(
        tool = tool_name,
        rowcount,
        result = %bounded(&result.to_string()),
        "tool execution complete"
    );

    Ok(result)
}

/// Reduce a row set per the cardinality rule.
fn reduce_rows(mut rows: Vec<serde_json::Map<String, Value>>) -> Value {
    if rows.len() == 1 {
        Value::Object(rows.remove(0))
    } else {
        json!({ "rows": rows })
    }
}

/// Truncate a rendering for log output.
fn bounded(s: &str) -> String {
    if s.len() <= LOG_RENDER_MAX {
        return s.to_string();
    }
    let truncated: String = s.chars().take(LOG_RENDER_MAX).collect();
    format!("{truncated}…")
}
