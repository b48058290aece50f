//! Push Message Codec
//!
//! Decodes the JSON envelopes delivered on the ticker feed.
//!
//! # Envelope Format
//!
//! ```json
//! {"type": "ticker", "data": {"symbol": "BTC/USDT", "last": 43250.5, ...}}
//! {"type": "error", "message": "exchange unavailable"}
//! ```
//!
//! Any other `type` is decoded as [`PushMessage::Other`] and ignored by the
//! client.

use serde::Deserialize;

use crate::domain::market::Ticker;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope lacks a string `type` field.
    #[error("envelope has no message type")]
    MissingType,

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Fresh ticker snapshot.
    Ticker(Ticker),
    /// Error reported by the server.
    Error(String),
    /// Any other message type.
    Other(String),
}

impl PushMessage {
    /// Message type label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Ticker(_) => "ticker",
            Self::Error(_) => "error",
            Self::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Fallback when a server error envelope carries no message.
const UNKNOWN_REMOTE_ERROR: &str = "unknown push channel error";

/// JSON codec for the ticker feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object envelope with a
    /// string `type`, or if a `ticker` envelope's `data` is not a ticker.
    pub fn decode(&self, text: &str) -> Result<PushMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        let envelope: Envelope = serde_json::from_str(trimmed)?;
        let kind = envelope.kind.ok_or(CodecError::MissingType)?;

        match kind.as_str() {
            "ticker" => {
                let data = envelope
                    .data
                    .ok_or_else(|| CodecError::InvalidFormat("ticker envelope without data".to_string()))?;
                Ok(PushMessage::Ticker(serde_json::from_value(data)?))
            }
            "error" => {
                let message = envelope
                    .message
                    .or_else(|| {
                        envelope
                            .data
                            .as_ref()
                            .and_then(|d| d.get("message"))
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| UNKNOWN_REMOTE_ERROR.to_string());
                Ok(PushMessage::Error(message))
            }
            _ => Ok(PushMessage::Other(kind)),
        }
    }
}
