//! Version tag and per-version headers.
//!
//! ```text
//! +-----------+------------------+---------------------------+
//! | version   | header (V1)      | payload                   |
//! | 2 bytes   | 1 byte           | rest, maybe compressed    |
//! +-----------+------------------+---------------------------+
//! ```
//!
//! The V1 header is a single byte naming the payload compression.

use crate::error::AgentCtlError;
use bytes::{Buf, BufMut, BytesMut};

/// Size of the version tag.
pub const VERSION_SIZE: usize = 2;

/// Protocol version. Only one is defined; any other tag on the wire is an
/// error, never a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Version {
    V1 = 0,
}

impl Version {
    pub fn encode(self, buf: &mut BytesMut) {
        buf.put_u16(self as u16);
    }

    /// Parses the version tag, returning it with the unread remainder.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), AgentCtlError> {
        AgentCtlError::check_len(data, VERSION_SIZE)?;
        let (mut head, rest) = data.split_at(VERSION_SIZE);
        Ok((Self::try_from(head.get_u16())?, rest))
    }
}

impl TryFrom<u16> for Version {
    type Error = AgentCtlError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Version::V1),
            _ => Err(AgentCtlError::UnknownVersion(value)),
        }
    }
}

/// How the payload after the header is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionType {
    Uncompressed = 0,
    Zlib = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = AgentCtlError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::Uncompressed),
            1 => Ok(CompressionType::Zlib),
            _ => Err(AgentCtlError::UnknownCompression(value)),
        }
    }
}

/// Header of a V1 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV1 {
    pub compression: CompressionType,
}

impl HeaderV1 {
    pub const SIZE: usize = 1;

    pub fn new(compression: CompressionType) -> Self {
        Self { compression }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.compression as u8);
    }

    /// Parses the header, returning it with the unread remainder.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), AgentCtlError> {
        AgentCtlError::check_len(data, Self::SIZE)?;
        let (head, rest) = data.split_at(Self::SIZE);
        Ok((Self::new(CompressionType::try_from(head[0])?), rest))
    }
}
