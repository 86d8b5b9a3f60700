//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding fetcher and core messages.
///
/// Every decode failure is terminal for the message being decoded. Nothing
/// in this crate retries or substitutes a default value.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated data: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown payload type: {0}")]
    UnknownPayloadType(u16),

    #[error("unknown fetcher type: {0}")]
    UnknownFetcherType(u16),

    #[error("unknown fetcher status: {0}")]
    UnknownStatus(u16),

    #[error("unknown message state: {0:?}")]
    UnknownState(String),

    #[error("unknown log level: {0:?}")]
    UnknownLogLevel(String),

    #[error("invalid header {}: {reason}", hex::encode(.raw))]
    InvalidHeader { raw: Vec<u8>, reason: String },

    #[error("invalid section name: {0:?}")]
    InvalidSectionName(String),

    #[error("invalid error class: {0:?}")]
    InvalidErrorClass(String),

    #[error("payload type mismatch: header says {header}, payload is {payload}")]
    PayloadMismatch { header: u16, payload: u16 },

    #[error("length mismatch: {declared} bytes declared, {used} bytes used")]
    LengthMismatch { declared: usize, used: usize },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    pub(crate) fn invalid_header(raw: &[u8], reason: impl Into<String>) -> Self {
        ProtocolError::InvalidHeader {
            raw: raw.to_vec(),
            reason: reason.into(),
        }
    }
}
