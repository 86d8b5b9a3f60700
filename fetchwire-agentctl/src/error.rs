//! Agent controller protocol errors.

use thiserror::Error;

/// Errors raised while framing or unframing agent controller messages.
#[derive(Debug, Error)]
pub enum AgentCtlError {
    #[error("truncated data: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unimplemented protocol version: {0}")]
    UnknownVersion(u16),

    #[error("unknown compression type: {0}")]
    UnknownCompression(u8),

    #[error("unknown transport protocol: {0:?}")]
    UnknownTransport(String),

    #[error("{0}")]
    NoData(String),

    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
}

impl AgentCtlError {
    pub(crate) fn check_len(data: &[u8], needed: usize) -> Result<(), Self> {
        if data.len() < needed {
            return Err(AgentCtlError::Truncated {
                needed,
                available: data.len(),
            });
        }
        Ok(())
    }
}
