//! Transport detection on the agent channel.
//!
//! The first two bytes a monitored endpoint sends name how the rest of the
//! stream is protected. Only TLS streams carry versioned controller
//! messages after the prefix.

use crate::error::AgentCtlError;

/// Size of the transport prefix.
pub const TRANSPORT_PREFIX_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// Unencrypted agent output; the prefix is the start of the first section.
    Plain,
    Md5,
    Sha256,
    Pbkdf2,
    None,
    Tls,
}

impl TransportProtocol {
    pub const ALL: [TransportProtocol; 6] = [
        TransportProtocol::Plain,
        TransportProtocol::Md5,
        TransportProtocol::Sha256,
        TransportProtocol::Pbkdf2,
        TransportProtocol::None,
        TransportProtocol::Tls,
    ];

    pub fn prefix(self) -> &'static [u8; TRANSPORT_PREFIX_SIZE] {
        match self {
            TransportProtocol::Plain => b"<<",
            TransportProtocol::Md5 => b"00",
            TransportProtocol::Sha256 => b"02",
            TransportProtocol::Pbkdf2 => b"03",
            TransportProtocol::None => b"99",
            TransportProtocol::Tls => b"16",
        }
    }

    /// Identifies the transport from the start of the stream.
    ///
    /// An empty stream fails with `empty_message`, which lets the caller say
    /// why nothing arrived.
    pub fn detect(data: &[u8], empty_message: &str) -> Result<Self, AgentCtlError> {
        if data.is_empty() {
            return Err(AgentCtlError::NoData(empty_message.to_string()));
        }
        let prefix = &data[..data.len().min(TRANSPORT_PREFIX_SIZE)];
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.prefix() == prefix)
            .ok_or_else(|| {
                AgentCtlError::UnknownTransport(String::from_utf8_lossy(prefix).into_owned())
            })
    }
}
