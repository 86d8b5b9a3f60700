//! Timing statistics attached to fetcher results and result batches.
//!
//! Both blocks share one layout, a length prefix followed by a JSON body:
//!
//! ```text
//! +-------------+----------------------+
//! | length      | JSON body            |
//! | 4 bytes     | length bytes         |
//! +-------------+----------------------+
//! ```
//!
//! The snapshot is carried for the caller and never interpreted here, apart
//! from the elapsed time needed for [`ResultStats::remaining_time`].

use crate::error::ProtocolError;
use crate::wire;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Size of the stats length prefix.
pub const STATS_LENGTH_SIZE: usize = 4;

/// Process and wall-clock times in seconds, serialized as a 5-element array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 5]", into = "[f64; 5]")]
pub struct ProcessTimes {
    pub user: f64,
    pub system: f64,
    pub children_user: f64,
    pub children_system: f64,
    pub elapsed: f64,
}

impl From<[f64; 5]> for ProcessTimes {
    fn from(t: [f64; 5]) -> Self {
        Self {
            user: t[0],
            system: t[1],
            children_user: t[2],
            children_system: t[3],
            elapsed: t[4],
        }
    }
}

impl From<ProcessTimes> for [f64; 5] {
    fn from(t: ProcessTimes) -> Self {
        [
            t.user,
            t.system,
            t.children_user,
            t.children_system,
            t.elapsed,
        ]
    }
}

/// Elapsed-time record captured by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub process: ProcessTimes,
}

impl Snapshot {
    pub fn new(process: ProcessTimes) -> Self {
        Self { process }
    }

    /// All-zero snapshot.
    pub fn null() -> Self {
        Self::default()
    }
}

/// Stats of a single fetcher run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetcherStats {
    pub duration: Snapshot,
}

impl FetcherStats {
    pub fn new(duration: Snapshot) -> Self {
        Self { duration }
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_block(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_block(data).map(|(stats, _)| stats)
    }

    /// Decodes a region that must hold exactly one stats block.
    pub(crate) fn decode_exact(data: &[u8]) -> Result<Self, ProtocolError> {
        let (stats, rest) = decode_block(data)?;
        wire::ensure_consumed(data, rest)?;
        Ok(stats)
    }
}

/// Stats of a whole result batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultStats {
    /// Batch timeout in seconds.
    pub timeout: u32,
    pub duration: Snapshot,
}

impl ResultStats {
    pub fn new(timeout: u32, duration: Snapshot) -> Self {
        Self { timeout, duration }
    }

    /// Seconds left before the batch timeout, never negative.
    pub fn remaining_time(&self) -> f64 {
        (f64::from(self.timeout) - self.duration.process.elapsed).max(0.0)
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_block(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        decode_block(data).map(|(stats, _)| stats)
    }

    /// Decodes a region that must hold exactly one stats block.
    pub(crate) fn decode_exact(data: &[u8]) -> Result<Self, ProtocolError> {
        let (stats, rest) = decode_block(data)?;
        wire::ensure_consumed(data, rest)?;
        Ok(stats)
    }
}

fn encode_block<T: Serialize>(value: &T) -> Result<BytesMut, ProtocolError> {
    let body = serde_json::to_vec(value)?;
    let len = wire::length_u32(body.len())?;
    let mut buf = BytesMut::with_capacity(STATS_LENGTH_SIZE + body.len());
    buf.put_u32(len);
    buf.put_slice(&body);
    Ok(buf)
}

fn decode_block<T: DeserializeOwned>(data: &[u8]) -> Result<(T, &[u8]), ProtocolError> {
    let (len, rest) = wire::read_u32(data)?;
    let (body, rest) = wire::split(rest, len as usize)?;
    Ok((serde_json::from_slice(body)?, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot::new(ProcessTimes {
            user: 0.25,
            system: 0.125,
            children_user: 0.0,
            children_system: 0.0,
            elapsed: 1.5,
        })
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"process": [0.25, 0.125, 0.0, 0.0, 1.5]})
        );
    }

    #[test]
    fn test_fetcher_stats_roundtrip() {
        let stats = FetcherStats::new(snapshot());
        let encoded = stats.encode().unwrap();

        let declared = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(declared as usize, encoded.len() - STATS_LENGTH_SIZE);
        assert_eq!(FetcherStats::decode(&encoded).unwrap(), stats);
    }

    #[test]
    fn test_result_stats_roundtrip_with_trailing_bytes() {
        let stats = ResultStats::new(60, snapshot());
        let mut encoded = stats.encode().unwrap();
        encoded.extend_from_slice(b"trailing garbage");
        assert_eq!(ResultStats::decode(&encoded).unwrap(), stats);
        assert!(matches!(
            ResultStats::decode_exact(&encoded),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_stats_truncated() {
        let encoded = FetcherStats::new(snapshot()).encode().unwrap();
        let result = FetcherStats::decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_stats_malformed_json() {
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_slice(b"{oops");
        assert!(matches!(
            FetcherStats::decode(&buf),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_remaining_time() {
        let stats = ResultStats::new(60, snapshot());
        assert_eq!(stats.remaining_time(), 58.5);

        let expired = ResultStats::new(1, snapshot());
        assert_eq!(expired.remaining_time(), 0.0);
    }

    #[test]
    fn test_null_snapshot() {
        assert_eq!(Snapshot::null().process.elapsed, 0.0);
        assert_eq!(ResultStats::new(10, Snapshot::null()).remaining_time(), 10.0);
    }
}
