//! # fetchwire-agentctl
//!
//! Framing between the agent controller and a monitored endpoint.
//!
//! This crate provides:
//! - Transport detection from the two-byte stream prefix
//! - The version tag and per-version headers
//! - Versioned messages with optional zlib compression

pub mod error;
pub mod header;
pub mod message;
pub mod transport;

pub use error::AgentCtlError;
pub use header::{CompressionType, HeaderV1, Version, VERSION_SIZE};
pub use message::{AgentCtlMessage, MessageV1};
pub use transport::{TransportProtocol, TRANSPORT_PREFIX_SIZE};

/// Splits a TLS-unwrapped agent stream into transport and payload.
///
/// Controller messages follow the transport prefix; any other transport
/// returns the bytes after the prefix untouched.
pub fn read_agent_stream(
    data: &[u8],
    empty_message: &str,
) -> Result<(TransportProtocol, bytes::Bytes), AgentCtlError> {
    let protocol = TransportProtocol::detect(data, empty_message)?;
    let rest = &data[TRANSPORT_PREFIX_SIZE..];
    let payload = match protocol {
        TransportProtocol::Tls => AgentCtlMessage::from_bytes(rest)?.into_payload(),
        _ => bytes::Bytes::copy_from_slice(rest),
    };
    Ok((protocol, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tls_stream_with_zlib_message() {
        let agent_output = b"<<<section:sep(0)>>>\nbody\n";
        let mut data = b"16".to_vec();
        data.extend_from_slice(
            &AgentCtlMessage::v1(CompressionType::Zlib, &agent_output[..])
                .encode()
                .unwrap(),
        );

        let (protocol, payload) = read_agent_stream(&data, "unused").unwrap();
        assert_eq!(protocol, TransportProtocol::Tls);
        assert_eq!(payload.as_ref(), agent_output);
    }

    #[test]
    fn test_read_plain_stream() {
        let (protocol, payload) = read_agent_stream(b"<<<df>>>\n", "unused").unwrap();
        assert_eq!(protocol, TransportProtocol::Plain);
        assert_eq!(payload.as_ref(), b"<df>>>\n");
    }

    #[test]
    fn test_read_tls_stream_with_unknown_version() {
        let err = read_agent_stream(b"16\x00\x09\x00payload", "unused").unwrap_err();
        assert!(matches!(err, AgentCtlError::UnknownVersion(9)));
    }
}
