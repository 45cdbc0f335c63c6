use thiserror::Error;

/// Top-level error type for the `marketfeed-api` crate.
///
/// Covers every failure mode of the feed transport: connecting, reading,
/// writing, and decoding the wire envelope. `marketfeed-core` maps these
/// into user-facing variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket handshake or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Write attempted on a connection that is not open.
    #[error("Connection is not open")]
    NotConnected,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// Inbound payload failed to parse or validate.
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },

    /// JSON encoding failed for an outbound command.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }

    /// Returns `true` if the error came from a bad inbound payload
    /// rather than the connection itself.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connection_and_payload_errors() {
        let closed = Error::WebSocketClosed {
            code: 1006,
            reason: "abnormal".into(),
        };
        assert!(closed.is_transient());
        assert!(!closed.is_malformed());

        let bad = Error::Malformed {
            reason: "missing `kind`".into(),
        };
        assert!(bad.is_malformed());
        assert!(!bad.is_transient());
        assert!(!Error::NotConnected.is_transient());
    }
}
