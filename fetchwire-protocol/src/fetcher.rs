//! Fetcher envelope: the unit produced by one fetcher run.
//!
//! ```text
//! +--------------+--------------+---------+----------------+--------------+
//! | fetcher_type | payload_type | status  | payload_length | stats_length |
//! | 2 bytes      | 2 bytes      | 2 bytes | 4 bytes        | 4 bytes      |
//! +--------------+--------------+---------+----------------+--------------+
//! | payload (result message)    | stats (fetcher stats)                   |
//! | payload_length bytes        | stats_length bytes                      |
//! +-----------------------------+-----------------------------------------+
//! ```
//!
//! Envelopes are concatenated inside a result batch, so decoding reads the
//! declared lengths and leaves whatever follows to the caller.

use crate::error::ProtocolError;
use crate::payload::{ErrorKind, PayloadType, RawData, ResultMessage, TransportedError};
use crate::stats::{FetcherStats, Snapshot};
use crate::wire;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed fetcher header in bytes (2+2+2+4+4 = 14).
pub const FETCHER_HEADER_SIZE: usize = 14;

/// Kind of collector that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FetcherType {
    None = 1,
    PushAgent = 2,
    Ipmi = 3,
    Piggyback = 4,
    Program = 5,
    SpecialAgent = 6,
    Snmp = 7,
    Tcp = 8,
}

impl FetcherType {
    /// Payload kind a successful run of this collector produces.
    pub fn payload_type(self) -> PayloadType {
        match self {
            FetcherType::Snmp => PayloadType::Snmp,
            _ => PayloadType::Agent,
        }
    }
}

impl TryFrom<u16> for FetcherType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FetcherType::None),
            2 => Ok(FetcherType::PushAgent),
            3 => Ok(FetcherType::Ipmi),
            4 => Ok(FetcherType::Piggyback),
            5 => Ok(FetcherType::Program),
            6 => Ok(FetcherType::SpecialAgent),
            7 => Ok(FetcherType::Snmp),
            8 => Ok(FetcherType::Tcp),
            _ => Err(ProtocolError::UnknownFetcherType(value)),
        }
    }
}

/// Outcome severity, on the same numeric scale as core log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FetcherStatus {
    Ok = 0,
    /// Expected collection failure.
    Info = 20,
    /// Timeout.
    Error = 40,
    Critical = 50,
}

impl FetcherStatus {
    /// Severity of a failed run.
    pub fn for_error(err: &TransportedError) -> Self {
        match err.kind() {
            ErrorKind::Fetcher => FetcherStatus::Info,
            ErrorKind::Timeout => FetcherStatus::Error,
            _ => FetcherStatus::Critical,
        }
    }
}

impl TryFrom<u16> for FetcherStatus {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(FetcherStatus::Ok),
            20 => Ok(FetcherStatus::Info),
            40 => Ok(FetcherStatus::Error),
            50 => Ok(FetcherStatus::Critical),
            _ => Err(ProtocolError::UnknownStatus(value)),
        }
    }
}

/// Parsed fetcher header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherHeader {
    pub fetcher_type: FetcherType,
    pub payload_type: PayloadType,
    pub status: FetcherStatus,
    pub payload_length: u32,
    pub stats_length: u32,
}

impl FetcherHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.fetcher_type as u16);
        buf.put_u16(self.payload_type as u16);
        buf.put_u16(self.status as u16);
        buf.put_u32(self.payload_length);
        buf.put_u32(self.stats_length);
    }

    /// Parses the first [`FETCHER_HEADER_SIZE`] bytes of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (fetcher_type, rest) = wire::read_u16(data)?;
        let (payload_type, rest) = wire::read_u16(rest)?;
        let (status, rest) = wire::read_u16(rest)?;
        let (payload_length, rest) = wire::read_u32(rest)?;
        let (stats_length, _) = wire::read_u32(rest)?;

        Ok(Self {
            fetcher_type: FetcherType::try_from(fetcher_type)?,
            payload_type: PayloadType::try_from(payload_type)?,
            status: FetcherStatus::try_from(status)?,
            payload_length,
            stats_length,
        })
    }

    /// Length of the whole envelope this header describes.
    pub fn total_len(&self) -> usize {
        FETCHER_HEADER_SIZE + self.payload_length as usize + self.stats_length as usize
    }
}

/// One fetcher result plus its timing stats.
#[derive(Debug, Clone)]
pub struct FetcherMessage {
    header: FetcherHeader,
    payload: ResultMessage,
    stats: FetcherStats,
    /// Encoded payload followed by encoded stats, as declared in the header.
    body: Bytes,
}

impl FetcherMessage {
    /// Wraps a payload produced by `fetcher_type`.
    ///
    /// Successful payloads must match the collector's payload kind.
    pub fn new(
        fetcher_type: FetcherType,
        payload: ResultMessage,
        stats: FetcherStats,
    ) -> Result<Self, ProtocolError> {
        let status = match &payload {
            ResultMessage::Error(err) => FetcherStatus::for_error(err),
            ok => {
                let expected = fetcher_type.payload_type();
                if ok.payload_type() != expected {
                    return Err(ProtocolError::PayloadMismatch {
                        header: expected as u16,
                        payload: ok.payload_type() as u16,
                    });
                }
                FetcherStatus::Ok
            }
        };

        let mut body = payload.encode()?;
        let payload_length = wire::length_u32(body.len())?;
        let stats_bytes = stats.encode()?;
        body.extend_from_slice(&stats_bytes);

        let header = FetcherHeader {
            fetcher_type,
            payload_type: payload.payload_type(),
            status,
            payload_length,
            stats_length: wire::length_u32(stats_bytes.len())?,
        };

        Ok(Self {
            header,
            payload,
            stats,
            body: body.freeze(),
        })
    }

    /// Builds the envelope for the outcome of one run.
    pub fn from_raw_data(
        raw_data: Result<RawData, TransportedError>,
        duration: Snapshot,
        fetcher_type: FetcherType,
    ) -> Result<Self, ProtocolError> {
        let payload = match raw_data {
            Ok(raw) => ResultMessage::from(raw),
            Err(err) => ResultMessage::Error(err),
        };
        Self::new(fetcher_type, payload, FetcherStats::new(duration))
    }

    pub fn error(
        fetcher_type: FetcherType,
        err: TransportedError,
        duration: Snapshot,
    ) -> Result<Self, ProtocolError> {
        Self::from_raw_data(Err(err), duration, fetcher_type)
    }

    pub fn header(&self) -> &FetcherHeader {
        &self.header
    }

    pub fn fetcher_type(&self) -> FetcherType {
        self.header.fetcher_type
    }

    pub fn payload(&self) -> &ResultMessage {
        &self.payload
    }

    pub fn stats(&self) -> &FetcherStats {
        &self.stats
    }

    /// The collected data or the transported error.
    pub fn raw_data(&self) -> Result<RawData, TransportedError> {
        self.payload.result()
    }

    /// Encoded length: header plus both declared lengths.
    pub fn encoded_len(&self) -> usize {
        self.header.total_len()
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.body);
        Ok(buf)
    }

    /// Decodes header, payload and stats in that order, ignoring any bytes
    /// beyond the declared lengths. Each declared length must be used
    /// exactly by the block it frames.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let header = FetcherHeader::from_bytes(data)?;
        let (_, rest) = wire::split(data, FETCHER_HEADER_SIZE)?;
        let (payload_bytes, rest) = wire::split(rest, header.payload_length as usize)?;
        let (stats_bytes, _) = wire::split(rest, header.stats_length as usize)?;

        let payload = ResultMessage::decode_exact(payload_bytes)?;
        if payload.payload_type() != header.payload_type {
            tracing::debug!(
                fetcher_type = ?header.fetcher_type,
                "fetcher header disagrees with payload type"
            );
            return Err(ProtocolError::PayloadMismatch {
                header: header.payload_type as u16,
                payload: payload.payload_type() as u16,
            });
        }
        let stats = FetcherStats::decode_exact(stats_bytes)?;

        let mut body = BytesMut::with_capacity(payload_bytes.len() + stats_bytes.len());
        body.put_slice(payload_bytes);
        body.put_slice(stats_bytes);

        Ok(Self {
            header,
            payload,
            stats,
            body: body.freeze(),
        })
    }
}

impl PartialEq for FetcherMessage {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload == other.payload && self.stats == other.stats
    }
}
