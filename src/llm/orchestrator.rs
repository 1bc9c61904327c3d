//! Multi-turn tool-calling conversation loop.
//!
//! Each request is a fresh, independent conversation: build the transcript,
//! let the model pick tools, execute them in emission order, fold results
//! back in, and terminate on a final answer, the iteration budget, or a
//! fatal error. Two auxiliary calls (auto host selection, finalization
//! restatement) recover from transport failure; nothing else is swallowed.

use crate::config::Config;
use crate::error::AskError;
use crate::llm::client::{ChatClient, ToolChoice};
use crate::llm::{finalize, timewindow};
use crate::state::Database;
use crate::tools::{self, ToolCatalog};
use crate::types::{ChatMessage, FunctionCallPayload, ToolCall, ToolCallPayload};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "\
Sen bir tool-orchestrator'sun.
- SQL üretme.
- Sadece verilen tool'ları seç ve çağır.
- host_id kullanıcı tarafından verilmemişse ASLA kullanıcıdan host_id isteme.
  Bunun yerine host_id parametresini OMIT et veya null gönder.
  (Sistem host_id null/olmaması durumunda otomatik en son host'u seçer.)
- minutes parametresi her zaman INTEGER olmalı (örn 60).
- Cevabı tool sonucu üzerinden ver; \"imkansız\" / \"host_id yok\" gibi kaçış cevapları verme.";

/// Terminal answer when the iteration budget is exhausted.
const BUDGET_EXHAUSTED_ANSWER: &str =
    "Tool çağrıları çok kez tekrarlandı; lütfen soruyu daha net sor.";

/// Canned answer when a tool ran but the model still escaped into a
/// "no data" reply.
const NO_COHERENT_ANSWER: &str =
    "Tool sonucu alındı ancak tutarlı bir cevap üretilemedi; lütfen soruyu daha net sor.";

/// The fallback tool used for automatic host selection.
const SNAPSHOT_TOOL: &str = "get_latest_snapshot";

/// Trailing commas before a closing bracket — the single class of malformed
/// JSON the inline-tool-call parser repairs.
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"));

/// Answer a user question by orchestrating a tool-calling conversation.
///
/// Returns the final answer string; unknown-tool, schema-violation, and
/// main-loop transport errors propagate to the caller.
pub async fn ask_with_tools(
    config: &Config,
    catalog: &ToolCatalog,
    client: &ChatClient,
    db: &Arc<Mutex<Database>>,
    user_text: &str,
) -> Result<String, AskError> {
    let descriptors = catalog.descriptors();
    let inferred_minutes = timewindow::infer_minutes(user_text);

    let mut messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_text),
    ];

    let mut did_auto_select_host = false;
    let mut any_tool_ran = false;

    for iteration in 0..config.llm_max_tool_iterations {
        info!(
            iteration,
            model = %client.model,
            tools = descriptors.len(),
            "requesting model decision"
        );

        let reply = client
            .chat(&messages, Some(descriptors.as_slice()), ToolChoice::Auto)
            .await?;

        let content = reply.content.unwrap_or_default();
        let mut tool_calls = reply.tool_calls;

        // Some models emit the tool invocation as inline JSON text instead
        // of a structured tool call; recover the recognized pattern.
        if tool_calls.is_empty() {
            if let Some(synthetic) = parse_inline_tool_call(&content, catalog, iteration) {
                debug!(tool = %synthetic.function.name, "recovered inline tool call from text");
                tool_calls = vec![synthetic];
            }
        }

        if tool_calls.is_empty() {
            // Before any tool ran: a refusal tied to the withheld host_id is
            // redirected once via automatic host selection.
            if !any_tool_ran && !did_auto_select_host && looks_like_hostid_refusal(&content) {
                match tools::execute_tool(catalog, db, SNAPSHOT_TOOL, &json!({ "host_id": null }))
                    .await
                {
                    Ok(snapshot) => {
                        if let Some(host_id) = snapshot.get("host_id").and_then(Value::as_str) {
                            did_auto_select_host = true;
                            info!(host_id, "auto-selected most recent host");
                            messages.push(ChatMessage::system(format!(
                                "Host otomatik seçildi. Varsayılan host_id={host_id}. \
                                 Kullanıcıdan host_id isteme; gerekiyorsa bunu kullan \
                                 ya da host_id'yi null/omitted bırak."
                            )));
                            continue;
                        }
                    }
                    Err(e) => {
                        // Recovered: the conversation proceeds without the fallback.
                        warn!("automatic host selection failed: {e}");
                    }
                }
            }

            // After a tool ran: an escape into "no data" is replaced with a
            // canned answer instead of being surfaced.
            if any_tool_ran && looks_like_escape(&content) {
                info!("model escaped after tool execution, returning canned answer");
                return Ok(NO_COHERENT_ANSWER.to_string());
            }

            info!(answer = %content, "final answer");
            return Ok(content);
        }

        messages.push(ChatMessage::assistant_with_calls(
            if content.is_empty() { None } else { Some(content) },
            tool_calls.clone(),
        ));

        // Execute in emission order; later calls may depend on earlier ones.
        let mut last_executed: Option<(String, Map<String, Value>, Value)> = None;

        for payload in &tool_calls {
            let call = ToolCall::from(payload);
            let mut args = parse_call_arguments(&call.arguments);

            // Backfill the inferred time window only where the tool accepts
            // a minutes argument and the model left it missing/zero/blank.
            if let Some(minutes) = inferred_minutes {
                let accepts = catalog
                    .get(&call.name)
                    .map(|spec| spec.accepts_parameter("minutes"))
                    .unwrap_or(false);
                if accepts && needs_minutes_backfill(args.get("minutes")) {
                    debug!(minutes, tool = %call.name, "backfilling inferred time window");
                    args.insert("minutes".into(), json!(minutes));
                }
            }

            let result =
                tools::execute_tool(catalog, db, &call.name, &Value::Object(args.clone())).await?;
            any_tool_ran = true;

            messages.push(ChatMessage::tool_result(
                call.id.clone(),
                call.name.clone(),
                result.to_string(),
            ));

            last_executed = Some((call.name.clone(), args, result));
        }

        // Finalization: when the formatter recognizes the last tool, the
        // answer is grounded in its result fields rather than the model.
        if let Some((tool_name, args, result)) = &last_executed {
            if let Some(grounded) = finalize::render_grounded(tool_name, args, result) {
                info!(tool = %tool_name, grounded = %grounded, "rendering grounded answer");
                return finalize::restate_grounded(client, user_text, &grounded).await;
            }
        }
    }

    info!("iteration budget exhausted");
    Ok(BUDGET_EXHAUSTED_ANSWER.to_string())
}

/// Parse a model-issued argument payload; invalid JSON degrades to an empty
/// argument set so schema defaults still apply.
fn parse_call_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// A missing, null, zero, or blank minutes value may be backfilled; an
/// explicit non-zero value is never overridden.
fn needs_minutes_backfill(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.is_empty() || s == "0"
        }
        _ => false,
    }
}

/// Best-effort parse of a plain-text reply that superficially encodes a tool
/// invocation as inline JSON. Only trailing-comma damage is repaired; this is
/// a recognized-pattern fallback, not a general fault-tolerant parser.
fn parse_inline_tool_call(
    content: &str,
    catalog: &ToolCatalog,
    iteration: u32,
) -> Option<ToolCallPayload> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return None;
    }

    let repaired = TRAILING_COMMA_RE.replace_all(trimmed, "$1");
    let parsed: Value = serde_json::from_str(&repaired).ok()?;

    let name = parsed.get("name")?.as_str()?;
    if !catalog.has(name) {
        return None;
    }
    let arguments = parsed.get("arguments")?.as_object()?.clone();

    Some(ToolCallPayload {
        id: format!("inline-{iteration}"),
        r#type: "function".into(),
        function: FunctionCallPayload {
            name: name.to_string(),
            arguments: Value::Object(arguments).to_string(),
        },
    })
}

/// Refusal heuristic: the model declined by demanding the withheld host_id.
fn looks_like_hostid_refusal(text: &str) -> bool {
    let t = text.to_lowercase();
    if !t.contains("host_id") && !t.contains("host id") {
        return false;
    }
    ["imkans", "cevap", "verilmiyor", "cannot", "can't", "impossible"]
        .iter()
        .any(|k| t.contains(k))
}

/// Escape heuristic: the model fell back to a "no data" style reply even
/// though a tool already produced a result.
fn looks_like_escape(text: &str) -> bool {
    let t = text.to_lowercase();
    [
        "veri yok",
        "veri bulunamadı",
        "imkans",
        "cevap verilemiyor",
        "cevap veremiyorum",
        "no data",
        "cannot answer",
    ]
    .iter()
    .any(|k| t.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shipped_catalog() -> ToolCatalog {
        ToolCatalog::load(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("catalog")).unwrap()
    }

    #[test]
    fn malformed_arguments_degrade_to_empty_set() {
        assert!(parse_call_arguments("{not json").is_empty());
        assert!(parse_call_arguments("[1, 2]").is_empty());
        let args = parse_call_arguments(r#"{"minutes": 15}"#);
        assert_eq!(args["minutes"], json!(15));
    }

    #[test]
    fn minutes_backfill_triggers_on_missing_zero_blank() {
        assert!(needs_minutes_backfill(None));
        assert!(needs_minutes_backfill(Some(&Value::Null)));
        assert!(needs_minutes_backfill(Some(&json!(0))));
        assert!(needs_minutes_backfill(Some(&json!(""))));
        assert!(needs_minutes_backfill(Some(&json!("0"))));
        assert!(!needs_minutes_backfill(Some(&json!(45))));
        assert!(!needs_minutes_backfill(Some(&json!("45"))));
    }

    #[test]
    fn inline_tool_call_repairs_trailing_commas() {
        let catalog = shipped_catalog();
        let content = r#"{"name": "get_max_cpu_usage", "arguments": {"minutes": 30,},}"#;
        let call = parse_inline_tool_call(content, &catalog, 0).unwrap();
        assert_eq!(call.function.name, "get_max_cpu_usage");
        let args: Value = serde_json::from_str(&call.function.arguments).unwrap();
        assert_eq!(args["minutes"], json!(30));
    }

    #[test]
    fn inline_parse_rejects_unknown_tools_and_non_objects() {
        let catalog = shipped_catalog();
        assert!(parse_inline_tool_call("plain text answer", &catalog, 0).is_none());
        assert!(parse_inline_tool_call(
            r#"{"name": "rm_rf", "arguments": {}}"#,
            &catalog,
            0
        )
        .is_none());
        assert!(parse_inline_tool_call(
            r#"{"name": "get_max_cpu_usage", "arguments": "minutes=30"}"#,
            &catalog,
            0
        )
        .is_none());
    }

    #[test]
    fn hostid_refusal_requires_both_signals() {
        assert!(looks_like_hostid_refusal(
            "host_id verilmediği için bu soruya cevap vermek imkansız."
        ));
        assert!(looks_like_hostid_refusal("Cannot answer without a host id."));
        assert!(!looks_like_hostid_refusal("CPU kullanımı %40 civarında."));
        assert!(!looks_like_hostid_refusal("host_id: ABC123"));
    }

    #[test]
    fn escape_detector_matches_no_data_replies() {
        assert!(looks_like_escape("Üzgünüm, veri yok."));
        assert!(looks_like_escape("There is no data for this window."));
        assert!(!looks_like_escape("Son 30 dakikada maksimum CPU %57.2."));
    }
}
