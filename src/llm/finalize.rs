//! Grounded answer rendering and the anti-hallucination finalization step.
//!
//! When the last executed tool is one this formatter recognizes, the answer
//! text is rendered directly from the tool's result fields. The model is then
//! asked once, with tool use disabled, to restate that answer
//! conversationally; a restatement that drops any literal numeric marker is
//! discarded in favor of the deterministic rendering. The model is never
//! trusted to invent or alter a number.

use crate::error::AskError;
use crate::llm::client::{ChatClient, ToolChoice};
use crate::types::ChatMessage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const RESTATE_PROMPT: &str = "Sana verilen cevabı tek cümleyle, doğal bir dille yeniden ifade et. \
Cevaptaki tüm sayısal değerleri AYNEN koru; hiçbir sayıyı değiştirme, yuvarlama veya çıkarma. \
Yeni bilgi ekleme.";

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("marker pattern is valid"));

/// Render a grounded Turkish answer from a recognized tool's result fields.
/// Returns None for tools the formatter does not recognize, leaving the
/// conversation loop to continue.
pub fn render_grounded(tool_name: &str, args: &Map<String, Value>, result: &Value) -> Option<String> {
    let minutes = args.get("minutes").and_then(Value::as_i64).unwrap_or(60);

    match tool_name {
        "get_max_cpu_usage" => match number(result, "max_cpu_usage_percent") {
            Some(v) => Some(format!(
                "Son {minutes} dakikada maksimum CPU kullanımı %{v}."
            )),
            None => Some(format!("Son {minutes} dakikada CPU ölçümü bulunamadı.")),
        },
        "get_avg_cpu_usage" => match number(result, "avg_cpu_usage_percent") {
            Some(v) => Some(format!(
                "Son {minutes} dakikada ortalama CPU kullanımı %{v}."
            )),
            None => Some(format!("Son {minutes} dakikada CPU ölçümü bulunamadı.")),
        },
        "get_max_cpu_temperature" => match number(result, "max_cpu_temperature_c") {
            Some(v) => Some(format!(
                "Son {minutes} dakikada maksimum CPU sıcaklığı {v}°C."
            )),
            None => Some(format!(
                "Son {minutes} dakikada CPU sıcaklık ölçümü bulunamadı."
            )),
        },
        "get_ram_usage" => match number(result, "max_ram_usage_percent") {
            Some(max) => {
                let avg = number(result, "avg_ram_usage_percent").unwrap_or_else(|| max.clone());
                Some(format!(
                    "Son {minutes} dakikada RAM kullanımı ortalama %{avg}, en yüksek %{max}."
                ))
            }
            None => Some(format!("Son {minutes} dakikada RAM ölçümü bulunamadı.")),
        },
        "get_gpu_stats" => match number(result, "max_gpu_utilization_percent") {
            Some(util) => match number(result, "max_gpu_temperature_c") {
                Some(temp) => Some(format!(
                    "Son {minutes} dakikada GPU kullanımı en yüksek %{util}, sıcaklık en yüksek {temp}°C."
                )),
                None => Some(format!(
                    "Son {minutes} dakikada GPU kullanımı en yüksek %{util}."
                )),
            },
            None => Some(format!("Son {minutes} dakikada GPU ölçümü bulunamadı.")),
        },
        "get_latest_snapshot" => {
            let cpu = number(result, "cpu_usage_percent")?;
            let hostname = result
                .get("hostname")
                .and_then(Value::as_str)
                .unwrap_or("host");
            let mut answer = format!("Şu an {hostname}: CPU %{cpu}");
            if let Some(ram) = number(result, "ram_usage_percent") {
                answer.push_str(&format!(", RAM %{ram}"));
            }
            if let Some(gpu) = number(result, "gpu_utilization_percent") {
                answer.push_str(&format!(", GPU %{gpu}"));
            }
            answer.push('.');
            Some(answer)
        }
        _ => None,
    }
}

/// Literal numeric substrings that must survive any rephrasing of the
/// grounded answer.
pub fn required_markers(grounded: &str) -> Vec<String> {
    let mut markers: Vec<String> = MARKER_RE
        .find_iter(grounded)
        .map(|m| m.as_str().to_string())
        .collect();
    markers.dedup();
    markers
}

/// Whether a restatement preserves every required marker verbatim.
pub fn preserves_markers(restatement: &str, markers: &[String]) -> bool {
    markers.iter().all(|m| restatement.contains(m.as_str()))
}

/// Ask the model to restate the grounded answer conversationally, with tool
/// use disabled. A transport failure or a restatement missing any marker
/// falls back to the deterministic rendering.
pub async fn restate_grounded(
    client: &ChatClient,
    user_text: &str,
    grounded: &str,
) -> Result<String, AskError> {
    let markers = required_markers(grounded);

    let messages = vec![
        ChatMessage::system(RESTATE_PROMPT),
        ChatMessage::user(format!("Soru: {user_text}\nCevap: {grounded}")),
    ];

    let reply = match client.chat(&messages, None, ToolChoice::None).await {
        Ok(reply) => reply,
        Err(e) if e.is_transport() => {
            warn!("finalization restatement failed, keeping grounded answer: {e}");
            return Ok(grounded.to_string());
        }
        Err(e) => return Err(e),
    };

    let restatement = reply.content.unwrap_or_default();
    let restatement = restatement.trim();

    if restatement.is_empty() || !preserves_markers(restatement, &markers) {
        debug!("restatement dropped a required marker, keeping grounded answer");
        return Ok(grounded.to_string());
    }

    Ok(restatement.to_string())
}

/// Extract a numeric field as its literal rendering.
fn number(result: &Value, key: &str) -> Option<String> {
    match result.get(key) {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
