//! Configuration schema for hwmetrics.toml.
//!
//! Loaded once in `main` and passed by reference to each component; there is
//! no process-wide settings singleton.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenAI-compatible chat-completions base URL.
    pub llm_base_url: String,

    /// Bearer token for the endpoint, if it requires one.
    pub llm_api_key: Option<String>,

    /// Model name sent with every request.
    pub llm_model: String,

    /// Per-request timeout for the chat endpoint, in seconds.
    pub llm_timeout_seconds: u64,

    /// Hard upper bound on orchestration loop iterations per question.
    pub llm_max_tool_iterations: u32,

    /// Collector sampling interval, in seconds.
    pub metrics_interval_seconds: u64,

    /// Path to the SQLite metrics database.
    pub db_path: String,

    /// Directory holding tool definitions (specs/*.json + sql/*.sql).
    pub tools_dir: String,

    /// HTTP listen address for the API server.
    pub listen_addr: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434/v1".into(),
            llm_api_key: None,
            llm_model: "llama3.1".into(),
            llm_timeout_seconds: 60,
            llm_max_tool_iterations: 5,
            metrics_interval_seconds: 10,
            db_path: "~/.hwmetrics/metrics.db".into(),
            tools_dir: "./catalog".into(),
            listen_addr: "127.0.0.1:8080".into(),
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Resolved tool definition directory.
    pub fn resolved_tools_dir(&self) -> String {
        self.resolve_path(&self.tools_dir)
    }
}
