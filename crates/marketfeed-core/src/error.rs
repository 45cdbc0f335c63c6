// ── Core error types ──
//
// User-facing errors from marketfeed-core. Consumers never see raw
// tungstenite or serde failures directly. The `From<marketfeed_api::Error>`
// impl translates transport-layer errors into these variants.
//
// Cloneable so the latest error can be published through a `watch` channel.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// Connection could not be opened or did not stay open.
    /// Recovered by the reconnection policy.
    #[error("Feed transport error: {reason}")]
    Transport { reason: String },

    /// The reconnection policy gave up. Persists until a manual retry.
    #[error("Feed unreachable after {attempts} reconnection attempts -- retry manually")]
    ExhaustedRetries { attempts: u32 },

    /// `send` called while no connection is open.
    #[error("Cannot send: feed is not connected")]
    SendWhileDisconnected,

    // ── Data errors ──────────────────────────────────────────────────
    /// An inbound payload failed to parse or validate. Non-fatal.
    #[error("Malformed feed message: {reason}")]
    MalformedMessage { reason: String },

    /// A snapshot section could not be decoded into the requested type.
    #[error("Section '{section}' could not be decoded: {reason}")]
    SectionDecode { section: String, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for errors that need explicit user action to clear.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExhaustedRetries { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<marketfeed_api::Error> for CoreError {
    fn from(err: marketfeed_api::Error) -> Self {
        match err {
            marketfeed_api::Error::WebSocketConnect(reason) => CoreError::Transport { reason },
            marketfeed_api::Error::WebSocketClosed { code, reason } => CoreError::Transport {
                reason: format!("closed (code {code}): {reason}"),
            },
            marketfeed_api::Error::NotConnected => CoreError::SendWhileDisconnected,
            marketfeed_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            marketfeed_api::Error::Malformed { reason } => CoreError::MalformedMessage { reason },
            marketfeed_api::Error::Json(e) => {
                CoreError::Internal(format!("JSON encoding error: {e}"))
            }
        }
    }
}
