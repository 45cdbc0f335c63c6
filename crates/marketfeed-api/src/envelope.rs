//! Wire envelope codec.
//!
//! Every frame on the feed is a JSON object of the shape
//! `{ "kind": "...", "data": { ... } }`. The producer historically used
//! `type` for the tag, so both spellings are accepted on input. Outbound
//! commands always use `kind`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ── Envelope ─────────────────────────────────────────────────────────

/// A single validated inbound message.
///
/// Immutable once built. `data` is guaranteed to be a JSON object so the
/// consolidator can split it into named sections without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Message tag, e.g. `"dashboard_update"`.
    pub kind: String,

    /// Structured payload, keyed by section name.
    pub data: Map<String, Value>,

    /// Local arrival time (not the producer's timestamp).
    pub received_at: DateTime<Utc>,

    /// Remaining top-level fields the producer sent (e.g. `timestamp`).
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Look up a single top-level section of the payload.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Loosely-typed shape used only during decoding, so that a missing
/// field produces a precise rejection reason instead of a serde error.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default, alias = "type")]
    kind: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// ── Normalizer ───────────────────────────────────────────────────────

/// Parse and validate a raw text frame into an [`Envelope`].
///
/// Rejections are always [`Error::Malformed`]; callers treat them as
/// non-fatal and keep the connection open.
pub fn normalize(text: &str) -> Result<Envelope, Error> {
    normalize_at(text, Utc::now())
}

/// Same as [`normalize`] with an explicit arrival time.
pub fn normalize_at(text: &str, received_at: DateTime<Utc>) -> Result<Envelope, Error> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(|e| Error::Malformed {
        reason: format!("invalid JSON: {e}"),
    })?;

    let kind = match raw.kind {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) => return Err(malformed("empty `kind`")),
        Some(Value::Null) | None => return Err(malformed("missing `kind`")),
        Some(other) => {
            return Err(malformed(&format!(
                "`kind` must be a string, got {}",
                json_type_name(&other)
            )));
        }
    };

    let data = match raw.data {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => return Err(malformed("missing `data`")),
        Some(other) => {
            return Err(malformed(&format!(
                "`data` must be an object, got {}",
                json_type_name(&other)
            )));
        }
    };

    Ok(Envelope {
        kind,
        data,
        received_at,
        extra: raw.extra,
    })
}

fn malformed(reason: &str) -> Error {
    Error::Malformed {
        reason: reason.to_owned(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Outbound commands ────────────────────────────────────────────────

/// A command sent upstream. Serialized with the same envelope shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Command {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Encode to the text frame sent over the wire.
    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn accepts_kind_and_data() {
        let env = normalize(r#"{"kind":"update","data":{"fast":{"x":1}}}"#).unwrap();
        assert_eq!(env.kind, "update");
        assert_eq!(env.section("fast"), Some(&json!({"x": 1})));
        assert!(env.extra.is_empty());
    }

    #[test]
    fn accepts_legacy_type_field() {
        let raw = json!({
            "type": "dashboard_update",
            "timestamp": "2025-04-01T12:00:00Z",
            "data": { "market_data": {} }
        });
        let env = normalize(&raw.to_string()).unwrap();
        assert_eq!(env.kind, "dashboard_update");
        assert_eq!(env.extra["timestamp"], "2025-04-01T12:00:00Z");
    }

    #[test]
    fn rejects_invalid_json() {
        let err = normalize("not json at all").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn rejects_missing_kind() {
        let err = normalize(r#"{"data":{}}"#).unwrap_err();
        assert!(err.to_string().contains("missing `kind`"), "{err}");
    }

    #[test]
    fn rejects_blank_kind() {
        let err = normalize(r#"{"kind":"  ","data":{}}"#).unwrap_err();
        assert!(err.to_string().contains("empty `kind`"), "{err}");
    }

    #[test]
    fn rejects_missing_or_null_data() {
        assert!(normalize(r#"{"kind":"update"}"#).unwrap_err().is_malformed());
        assert!(
            normalize(r#"{"kind":"update","data":null}"#)
                .unwrap_err()
                .is_malformed()
        );
    }

    #[test]
    fn rejects_non_object_data() {
        let err = normalize(r#"{"kind":"update","data":[1,2,3]}"#).unwrap_err();
        assert!(err.to_string().contains("got array"), "{err}");
    }

    #[test]
    fn rejects_top_level_array() {
        assert!(normalize("[]").unwrap_err().is_malformed());
    }

    #[test]
    fn command_encodes_as_envelope() {
        let cmd = Command::new("subscribe", json!({ "coins": ["BTC", "ETH"] }));
        let text = cmd.encode().unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, json!({ "kind": "subscribe", "data": { "coins": ["BTC", "ETH"] } }));
    }
}
