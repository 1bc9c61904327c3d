//! Request-level error taxonomy for the ask pipeline.
//!
//! The variants make recovered-vs-fatal explicit at call sites: the
//! orchestrator's main loop propagates everything, while the two auxiliary
//! calls (auto-fallback snapshot, finalization restatement) recover from
//! transport failures only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AskError {
    /// The model named a tool that is not in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Sanitized arguments still failed schema validation. Intentionally not
    /// auto-corrected further: this signals a tool authoring bug or an
    /// unrecoverable model error.
    #[error("arguments for tool '{tool}' failed schema validation: {detail}")]
    SchemaViolation { tool: String, detail: String },

    /// Network-level failure reaching the chat-completions endpoint
    /// (connect error, timeout, malformed response body).
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("inference endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// Infrastructure failure (database, serialization).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AskError {
    /// True for the transport-failure class, which auxiliary call sites are
    /// allowed to recover from.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Endpoint { .. })
    }
}
