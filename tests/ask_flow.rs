//! End-to-end orchestration tests against a mocked chat-completions endpoint.
//!
//! Mocks are matched in reverse declaration order, so phase-specific mocks
//! are declared after the generic first-turn mock where a test needs a
//! response sequence.

use chrono::{Duration, Utc};
use hwmetrics::config::Config;
use hwmetrics::error::AskError;
use hwmetrics::llm::{ask_with_tools, ChatClient};
use hwmetrics::state::{sqlite_ts, Database};
use hwmetrics::tools::ToolCatalog;
use hwmetrics::types::{CpuSample, HostInfo};
use mockito::{Matcher, ServerGuard};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

fn shipped_catalog() -> ToolCatalog {
    ToolCatalog::load(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("catalog")).unwrap()
}

fn test_config(server: &ServerGuard) -> Config {
    Config {
        llm_base_url: server.url(),
        llm_model: "test-model".into(),
        llm_max_tool_iterations: 3,
        llm_timeout_seconds: 5,
        ..Default::default()
    }
}

/// In-memory database with one host and CPU samples at the given
/// (minutes-ago, usage) offsets.
fn seeded_db(samples: &[(i64, f64)]) -> Arc<Mutex<Database>> {
    let db = Database::open_memory().unwrap();
    let host_id = db
        .upsert_host(&HostInfo {
            hostname: "atlas".into(),
            os_name: Some("linux".into()),
            ..Default::default()
        })
        .unwrap();
    for (minutes_ago, usage) in samples {
        let ts = sqlite_ts(Utc::now() - Duration::minutes(*minutes_ago));
        db.insert_cpu_sample(
            &host_id,
            &ts,
            &CpuSample {
                usage_percent: *usage,
                temperature_c: Some(58.5),
                freq_mhz: Some(3100.0),
            },
        )
        .unwrap();
    }
    Arc::new(Mutex::new(db))
}

fn tool_call_body(name: &str, arguments: &str) -> String {
    json!({
        "choices": [{
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                }]
            }
        }]
    })
    .to_string()
}

fn text_body(content: &str) -> String {
    json!({
        "choices": [{ "message": { "content": content } }]
    })
    .to_string()
}

#[tokio::test]
async fn end_to_end_inferred_minutes_ground_the_answer() {
    let mut server = mockito::Server::new_async().await;

    // Model asks for max CPU usage with a zeroed window; the inferred
    // 30 minutes from the user text must backfill it.
    let _tool_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body(
            "get_max_cpu_usage",
            r#"{"minutes": 0, "host_id": "<nil>"}"#,
        ))
        .create_async()
        .await;

    // Restatement keeps every marker, so it is accepted verbatim.
    let _restate_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"none""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body(
            "Son 30 dakikada işlemci en fazla %57.2 seviyesini gördü.",
        ))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(5, 57.2), (12, 31.4)]);

    let answer = ask_with_tools(
        &config,
        &catalog,
        &client,
        &db,
        "son 30 dakikada maksimum CPU kullanımı?",
    )
    .await
    .unwrap();

    assert!(answer.contains("57.2"), "answer was: {answer}");
    assert_eq!(answer, "Son 30 dakikada işlemci en fazla %57.2 seviyesini gördü.");
}

#[tokio::test]
async fn restatement_missing_marker_falls_back_to_grounded() {
    let mut server = mockito::Server::new_async().await;

    let _tool_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("get_max_cpu_usage", r#"{"minutes": 30}"#))
        .create_async()
        .await;

    // The restatement drops the number entirely.
    let _restate_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"none""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("CPU kullanımı gayet makul seviyelerdeydi."))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(5, 57.2)]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "CPU durumu?")
        .await
        .unwrap();

    assert_eq!(answer, "Son 30 dakikada maksimum CPU kullanımı %57.2.");
}

#[tokio::test]
async fn budget_termination_when_model_always_calls_tools() {
    let mut server = mockito::Server::new_async().await;

    // History is not recognized by the deterministic formatter, so the loop
    // keeps iterating until the budget runs out.
    let tool_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("get_cpu_usage_history", r#"{"minutes": 60}"#))
        .expect(3)
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(1, 10.0), (2, 20.0)]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "CPU geçmişi?")
        .await
        .unwrap();

    assert_eq!(
        answer,
        "Tool çağrıları çok kez tekrarlandı; lütfen soruyu daha net sor."
    );
    tool_turn.assert_async().await;
}

#[tokio::test]
async fn plain_text_answer_passes_through() {
    let mut server = mockito::Server::new_async().await;

    let _turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("Merhaba! Donanım metrikleri hakkında soru sorabilirsin."))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "merhaba")
        .await
        .unwrap();

    assert!(answer.starts_with("Merhaba!"));
}

#[tokio::test]
async fn inline_tool_json_is_recovered_and_executed() {
    let mut server = mockito::Server::new_async().await;

    // The model encodes the invocation as inline text with a trailing comma
    // instead of a structured tool call.
    let _tool_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body(
            r#"{"name": "get_max_cpu_usage", "arguments": {"minutes": 30,}}"#,
        ))
        .create_async()
        .await;

    let _restate_turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"none""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("Son 30 dakikada en yüksek CPU kullanımı %44.1 oldu."))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(3, 44.1)]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "CPU?")
        .await
        .unwrap();

    assert!(answer.contains("44.1"), "answer was: {answer}");
}

#[tokio::test]
async fn escape_after_tool_returns_canned_answer() {
    let mut server = mockito::Server::new_async().await;

    // First turn: a tool call whose distinctive argument ends up echoed in
    // the follow-up transcript.
    let _first = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("get_cpu_usage_history", r#"{"minutes": 77}"#))
        .create_async()
        .await;

    // Second turn (transcript now contains the echoed call): the model
    // escapes with a "no data" reply despite the tool result.
    let _second = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("77".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("Üzgünüm, bu pencere için veri yok."))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(1, 15.0), (2, 25.0)]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "CPU geçmişi?")
        .await
        .unwrap();

    assert_eq!(
        answer,
        "Tool sonucu alındı ancak tutarlı bir cevap üretilemedi; lütfen soruyu daha net sor."
    );
}

#[tokio::test]
async fn hostid_refusal_triggers_auto_host_selection() {
    let mut server = mockito::Server::new_async().await;

    // First turn: the model refuses because host_id was withheld.
    let _first = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body(
            "host_id verilmediği için bu soruya cevap vermek imkansız.",
        ))
        .create_async()
        .await;

    // Second turn (after the auto-selection system message was injected):
    // a plain final answer.
    let _second = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("Host otomatik seçildi".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(text_body("Seçilen host için CPU kullanımı %12.5 civarında."))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[(2, 12.5)]);

    let answer = ask_with_tools(&config, &catalog, &client, &db, "CPU kullanımı nasıl?")
        .await
        .unwrap();

    assert!(answer.contains("12.5"), "answer was: {answer}");
}

#[tokio::test]
async fn unknown_tool_from_model_is_fatal() {
    let mut server = mockito::Server::new_async().await;

    let _turn = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(r#""tool_choice":"auto""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(tool_call_body("get_disk_usage", "{}"))
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[]);

    let err = ask_with_tools(&config, &catalog, &client, &db, "disk doluluk?")
        .await
        .unwrap_err();

    assert!(matches!(err, AskError::UnknownTool(name) if name == "get_disk_usage"));
}

#[tokio::test]
async fn endpoint_failure_in_main_loop_is_fatal() {
    let mut server = mockito::Server::new_async().await;

    let _turn = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let config = test_config(&server);
    let catalog = shipped_catalog();
    let client = ChatClient::new(&config).unwrap();
    let db = seeded_db(&[]);

    let err = ask_with_tools(&config, &catalog, &client, &db, "CPU?")
        .await
        .unwrap_err();

    assert!(err.is_transport());
}
