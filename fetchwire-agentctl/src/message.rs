//! Versioned agent controller messages with optional zlib payloads.

use crate::error::AgentCtlError;
use crate::header::{CompressionType, HeaderV1, Version, VERSION_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{self, Write};

/// A V1 message: header plus logical (decompressed) payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageV1 {
    header: HeaderV1,
    payload: Bytes,
}

impl MessageV1 {
    pub fn new(compression: CompressionType, payload: Bytes) -> Self {
        Self {
            header: HeaderV1::new(compression),
            payload,
        }
    }

    pub fn header(&self) -> &HeaderV1 {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encodes header and payload, compressing at `level` if the header
    /// asks for zlib.
    pub fn encode_with_level(
        &self,
        buf: &mut BytesMut,
        level: Compression,
    ) -> Result<(), AgentCtlError> {
        self.header.encode(buf);
        match self.header.compression {
            CompressionType::Uncompressed => buf.put_slice(&self.payload),
            CompressionType::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), level);
                encoder
                    .write_all(&self.payload)
                    .map_err(AgentCtlError::Compression)?;
                let compressed = encoder.finish().map_err(AgentCtlError::Compression)?;
                buf.put_slice(&compressed);
            }
        }
        Ok(())
    }

    /// Decodes a message whose version tag was already consumed. Everything
    /// after the header is payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, AgentCtlError> {
        let (header, rest) = HeaderV1::from_bytes(data)?;
        let payload = match header.compression {
            CompressionType::Uncompressed => Bytes::copy_from_slice(rest),
            CompressionType::Zlib => Bytes::from(inflate(rest).map_err(|err| {
                tracing::debug!(error = %err, len = rest.len(), "zlib payload rejected");
                AgentCtlError::Decompression(err)
            })?),
        };
        Ok(Self { header, payload })
    }
}

/// Inflates a complete zlib stream. A stream that ends before its trailer is
/// an error, not a short payload.
fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (total_in, total_out) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress_vec(&data[total_in as usize..], &mut out, FlushDecompress::None)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if status == Status::StreamEnd {
            return Ok(out);
        }
        // No progress with room left in `out`: the input is exhausted.
        if inflater.total_in() == total_in && inflater.total_out() == total_out {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "zlib stream ended before its trailer",
            ));
        }
    }
}

/// Top-level agent controller message: version tag plus the matching
/// per-version message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCtlMessage {
    V1(MessageV1),
}

impl AgentCtlMessage {
    pub fn v1(compression: CompressionType, payload: impl Into<Bytes>) -> Self {
        AgentCtlMessage::V1(MessageV1::new(compression, payload.into()))
    }

    pub fn version(&self) -> Version {
        match self {
            AgentCtlMessage::V1(_) => Version::V1,
        }
    }

    /// Logical payload after decompression.
    pub fn payload(&self) -> &Bytes {
        match self {
            AgentCtlMessage::V1(msg) => msg.payload(),
        }
    }

    pub fn into_payload(self) -> Bytes {
        match self {
            AgentCtlMessage::V1(msg) => msg.payload,
        }
    }

    pub fn encode(&self) -> Result<BytesMut, AgentCtlError> {
        self.encode_with_level(Compression::default())
    }

    pub fn encode_with_level(&self, level: Compression) -> Result<BytesMut, AgentCtlError> {
        let mut buf = BytesMut::with_capacity(VERSION_SIZE + HeaderV1::SIZE + self.payload().len());
        self.version().encode(&mut buf);
        match self {
            AgentCtlMessage::V1(msg) => msg.encode_with_level(&mut buf, level)?,
        }
        Ok(buf)
    }

    /// Decodes a message, dispatching on the version tag.
    pub fn from_bytes(data: &[u8]) -> Result<Self, AgentCtlError> {
        let (version, rest) = Version::from_bytes(data)?;
        match version {
            Version::V1 => MessageV1::from_bytes(rest).map(AgentCtlMessage::V1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const AGENT_OUTPUT: &[u8] = b"<<<check_mk>>>\nVersion: 2.1.0\n<<<df>>>\n/dev/sda1 100 50\n";

    #[test]
    fn test_zlib_roundtrip() {
        let msg = AgentCtlMessage::v1(CompressionType::Zlib, AGENT_OUTPUT);
        let encoded = msg.encode().unwrap();

        assert_eq!(&encoded[..3], &[0x00, 0x00, CompressionType::Zlib as u8]);
        let decoded = AgentCtlMessage::from_bytes(&encoded).unwrap();
        assert_eq!(decoded.payload().as_ref(), AGENT_OUTPUT);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_zlib_body_is_standard_zlib_stream() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(AGENT_OUTPUT).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut data = vec![0x00, 0x00, 0x01];
        data.extend_from_slice(&compressed);
        let decoded = AgentCtlMessage::from_bytes(&data).unwrap();
        assert_eq!(decoded.into_payload().as_ref(), AGENT_OUTPUT);
    }

    #[test]
    fn test_zlib_empty_payload() {
        let msg = AgentCtlMessage::v1(CompressionType::Zlib, Bytes::new());
        let encoded = msg.encode().unwrap();
        assert!(encoded.len() > VERSION_SIZE + HeaderV1::SIZE);
        assert_eq!(AgentCtlMessage::from_bytes(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_uncompressed_passthrough() {
        let msg = AgentCtlMessage::v1(CompressionType::Uncompressed, AGENT_OUTPUT);
        let encoded = msg.encode().unwrap();
        assert_eq!(&encoded[3..], AGENT_OUTPUT);
        assert_eq!(AgentCtlMessage::from_bytes(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_corrupted_zlib_payload() {
        let mut encoded = AgentCtlMessage::v1(CompressionType::Zlib, AGENT_OUTPUT)
            .encode()
            .unwrap();
        // A final block with the reserved block type.
        for byte in &mut encoded[5..] {
            *byte = 0xff;
        }

        let err = AgentCtlMessage::from_bytes(&encoded).unwrap_err();
        assert!(matches!(err, AgentCtlError::Decompression(_)));
        assert!(err.to_string().contains("decompression"));
    }

    #[test]
    fn test_truncated_zlib_payload() {
        let encoded = AgentCtlMessage::v1(CompressionType::Zlib, AGENT_OUTPUT.repeat(4))
            .encode()
            .unwrap();
        let err = AgentCtlMessage::from_bytes(&encoded[..encoded.len() - 6]).unwrap_err();
        assert!(matches!(err, AgentCtlError::Decompression(_)));
    }

    #[test]
    fn test_garbage_after_zlib_header() {
        let err = AgentCtlMessage::from_bytes(b"\x00\x00\x01not zlib at all").unwrap_err();
        assert!(matches!(err, AgentCtlError::Decompression(_)));
    }

    #[test]
    fn test_unknown_version_is_not_treated_as_v1() {
        let mut encoded = AgentCtlMessage::v1(CompressionType::Uncompressed, AGENT_OUTPUT)
            .encode()
            .unwrap();
        encoded[1] = 0x02;
        assert!(matches!(
            AgentCtlMessage::from_bytes(&encoded),
            Err(AgentCtlError::UnknownVersion(2))
        ));
    }

    #[test]
    fn test_zlib_highly_compressible_payload() {
        for size in [256, 1024, 4096, 65536] {
            let payload = vec![b'a'; size];
            let msg = AgentCtlMessage::v1(CompressionType::Zlib, payload.clone());
            let encoded = msg.encode().unwrap();
            assert!(encoded.len() * 4 < size + 64);

            let decoded = AgentCtlMessage::from_bytes(&encoded).unwrap();
            assert_eq!(decoded.payload().as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn test_truncated_compressible_payload() {
        let encoded = AgentCtlMessage::v1(CompressionType::Zlib, vec![b'a'; 65536])
            .encode()
            .unwrap();
        let err = AgentCtlMessage::from_bytes(&encoded[..encoded.len() - 4]).unwrap_err();
        assert!(matches!(err, AgentCtlError::Decompression(_)));
    }

    #[test]
    fn test_compression_levels_agree() {
        let msg = AgentCtlMessage::v1(CompressionType::Zlib, AGENT_OUTPUT.repeat(20));
        let fast = msg.encode_with_level(Compression::fast()).unwrap();
        let best = msg.encode_with_level(Compression::best()).unwrap();
        assert_eq!(AgentCtlMessage::from_bytes(&fast).unwrap(), msg);
        assert_eq!(AgentCtlMessage::from_bytes(&best).unwrap(), msg);
    }

    proptest! {
        #[test]
        fn prop_zlib_is_lossless(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let msg = AgentCtlMessage::v1(CompressionType::Zlib, payload.clone());
            let decoded = AgentCtlMessage::from_bytes(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
        }

        #[test]
        fn prop_zlib_is_lossless_for_repetitive_data(
            byte in any::<u8>(),
            len in 0..100_000usize,
            tail in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut payload = vec![byte; len];
            payload.extend_from_slice(&tail);
            let msg = AgentCtlMessage::v1(CompressionType::Zlib, payload.clone());
            let decoded = AgentCtlMessage::from_bytes(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
        }

        #[test]
        fn prop_uncompressed_is_lossless(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let msg = AgentCtlMessage::v1(CompressionType::Uncompressed, payload.clone());
            let decoded = AgentCtlMessage::from_bytes(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
        }
    }
}
