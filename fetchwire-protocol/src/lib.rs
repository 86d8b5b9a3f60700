//! # fetchwire-protocol
//!
//! Wire protocol between fetchers and the monitoring core.
//!
//! This crate provides:
//! - Result payloads (raw agent data, SNMP tables, transported errors)
//! - Timing stats blocks
//! - Fetcher envelopes wrapping one payload and its stats
//! - Core messages: result batches, log lines, end of reply
//! - A buffering decoder for core message streams

pub mod cmc;
pub mod codec;
pub mod error;
pub mod fetcher;
pub mod payload;
pub mod stats;
mod wire;

pub use cmc::{
    CmcHeader, CmcLogLevel, CmcMessage, CmcResults, EndOfReply, ResultsIdentifier, State,
    CMC_HEADER_SIZE,
};
pub use codec::CmcDecoder;
pub use error::ProtocolError;
pub use fetcher::{FetcherHeader, FetcherMessage, FetcherStatus, FetcherType, FETCHER_HEADER_SIZE};
pub use payload::{
    ErrorClass, ErrorKind, PayloadType, RawData, ResultMessage, SectionName, SnmpRawData,
    SnmpTable, TransportedError, PAYLOAD_HEADER_SIZE,
};
pub use stats::{FetcherStats, ProcessTimes, ResultStats, Snapshot};

/// Protocol name written into every core message header.
pub const PROTOCOL_NAME: &str = "fetch";

/// Maximum payload size of a core message (256 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;
