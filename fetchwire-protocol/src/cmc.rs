//! Messages exchanged with the monitoring core.
//!
//! Every message starts with a fixed 40-byte ASCII header of four
//! colon-terminated fields:
//!
//! ```text
//! +-------+---+---------+---+-----------+---+--------------------+---+
//! | name  | : | state   | : | log level | : | payload length     | : |
//! | 5     | 1 | 7       | 1 | 8         | 1 | 16, left-justified | 1 |
//! +-------+---+---------+---+-----------+---+--------------------+---+
//! ```
//!
//! The header layout is shared with the core and must stay byte-stable.
//!
//! Payload by state:
//! - `RESULT `: u32 count, that many fetcher envelopes, results identifier
//!   (u32 serial, u32 host name length, host name), result stats.
//! - `LOG    `: UTF-8 log text, unframed.
//! - `ENDREPL`: nothing.

use crate::error::ProtocolError;
use crate::fetcher::FetcherMessage;
use crate::stats::{ResultStats, Snapshot};
use crate::{wire, MAX_PAYLOAD_SIZE, PROTOCOL_NAME};
use bytes::{BufMut, BytesMut};
use std::sync::OnceLock;

/// Size of the core message header: 5+1+7+1+8+1+16+1.
pub const CMC_HEADER_SIZE: usize = 40;

const NAME_WIDTH: usize = 5;
const LEVEL_WIDTH: usize = 8;
const LENGTH_WIDTH: usize = 16;
const SEPARATORS: [usize; 4] = [5, 13, 22, 39];

/// Kind of core message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Result,
    Log,
    EndOfReply,
}

impl State {
    /// Fixed 7-character wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            State::Result => "RESULT ",
            State::Log => "LOG    ",
            State::EndOfReply => "ENDREPL",
        }
    }

    fn from_tag(tag: &str) -> Result<Self, ProtocolError> {
        match tag {
            "RESULT " => Ok(State::Result),
            "LOG    " => Ok(State::Log),
            "ENDREPL" => Ok(State::EndOfReply),
            _ => Err(ProtocolError::UnknownState(tag.to_string())),
        }
    }
}

/// Log levels understood by the core, highest severity first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CmcLogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl CmcLogLevel {
    pub const ALL: [CmcLogLevel; 8] = [
        CmcLogLevel::Emergency,
        CmcLogLevel::Alert,
        CmcLogLevel::Critical,
        CmcLogLevel::Error,
        CmcLogLevel::Warning,
        CmcLogLevel::Notice,
        CmcLogLevel::Info,
        CmcLogLevel::Debug,
    ];

    /// Wire tag, at most 8 characters.
    pub fn tag(self) -> &'static str {
        match self {
            // Truncated to fit the field.
            CmcLogLevel::Emergency => "emergenc",
            CmcLogLevel::Alert => "alert",
            CmcLogLevel::Critical => "critical",
            CmcLogLevel::Error => "error",
            CmcLogLevel::Warning => "warning",
            CmcLogLevel::Notice => "notice",
            CmcLogLevel::Info => "info",
            CmcLogLevel::Debug => "debug",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CmcLogLevel::Emergency => "emergency",
            other => other.tag(),
        }
    }

    /// Numeric severity of this level.
    pub fn severity(self) -> u8 {
        match self {
            CmcLogLevel::Emergency => 60,
            CmcLogLevel::Alert => 55,
            CmcLogLevel::Critical => 50,
            CmcLogLevel::Error => 40,
            CmcLogLevel::Warning => 30,
            CmcLogLevel::Notice => 25,
            CmcLogLevel::Info => 20,
            CmcLogLevel::Debug => 10,
        }
    }

    /// Maps a numeric severity to the highest level it reaches.
    pub fn from_level(level: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|l| level >= l.severity())
            .unwrap_or(CmcLogLevel::Debug)
    }

    fn from_tag(tag: &str) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|l| l.tag() == tag)
            .ok_or_else(|| ProtocolError::UnknownLogLevel(tag.to_string()))
    }
}

/// Parsed core message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmcHeader {
    name: String,
    state: State,
    log_level: Option<CmcLogLevel>,
    payload_length: usize,
}

impl CmcHeader {
    /// Builds a header. Only `LOG` messages carry a level, and they always do.
    pub fn new(
        name: impl Into<String>,
        state: State,
        log_level: Option<CmcLogLevel>,
        payload_length: usize,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.len() > NAME_WIDTH || !name.is_ascii() || name.contains(':') {
            return Err(ProtocolError::invalid_header(
                name.as_bytes(),
                "protocol name must be at most 5 ASCII characters without ':'",
            ));
        }
        if log_level.is_some() != (state == State::Log) {
            return Err(ProtocolError::invalid_header(
                name.as_bytes(),
                format!("{} message with log level {:?}", state.tag().trim_end(), log_level),
            ));
        }
        if payload_length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            name,
            state,
            log_level,
            payload_length,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn log_level(&self) -> Option<CmcLogLevel> {
        self.log_level
    }

    pub fn payload_length(&self) -> usize {
        self.payload_length
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let level = self.log_level.map(CmcLogLevel::tag).unwrap_or("");
        let header = format!(
            "{:<name_w$}:{}:{:<level_w$}:{:<length_w$}:",
            self.name,
            self.state.tag(),
            level,
            self.payload_length,
            name_w = NAME_WIDTH,
            level_w = LEVEL_WIDTH,
            length_w = LENGTH_WIDTH,
        );
        debug_assert_eq!(header.len(), CMC_HEADER_SIZE);
        buf.put_slice(header.as_bytes());
    }

    /// Parses the first [`CMC_HEADER_SIZE`] bytes of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (raw, _) = wire::split(data, CMC_HEADER_SIZE)?;
        let text = std::str::from_utf8(raw)
            .ok()
            .filter(|text| text.is_ascii())
            .ok_or_else(|| ProtocolError::invalid_header(raw, "header is not ASCII"))?;

        if SEPARATORS.iter().any(|&pos| raw[pos] != b':') {
            return Err(ProtocolError::invalid_header(raw, "misplaced field separator"));
        }

        let name = text[0..5].trim_end();
        let state = State::from_tag(&text[6..13])?;
        let log_level = match text[14..22].trim_end() {
            "" => None,
            tag => Some(CmcLogLevel::from_tag(tag)?),
        };
        let payload_length = text[23..39]
            .trim()
            .parse::<u64>()
            .map_err(|_| ProtocolError::invalid_header(raw, "payload length is not a number"))?;
        if payload_length > MAX_PAYLOAD_SIZE as u64 {
            return Err(ProtocolError::PayloadTooLarge {
                size: wire::declared_len(payload_length),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Self::new(name, state, log_level, payload_length as usize).map_err(|err| match err {
            ProtocolError::InvalidHeader { reason, .. } => {
                ProtocolError::invalid_header(raw, reason)
            }
            other => other,
        })
    }
}

/// Correlates a result batch with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsIdentifier {
    pub serial: u32,
    pub host_name: String,
}

impl ResultsIdentifier {
    pub fn new(serial: u32, host_name: impl Into<String>) -> Self {
        Self {
            serial,
            host_name: host_name.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        8 + self.host_name.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u32(self.serial);
        buf.put_u32(wire::length_u32(self.host_name.len())?);
        buf.put_slice(self.host_name.as_bytes());
        Ok(())
    }

    /// Decodes an identifier, returning it with the unread remainder.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (serial, rest) = wire::read_u32(data)?;
        let (len, rest) = wire::read_u32(rest)?;
        let (name, rest) = wire::split(rest, len as usize)?;
        let host_name = std::str::from_utf8(name).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok((Self::new(serial, host_name), rest))
    }
}

/// Payload of a `RESULT` message.
#[derive(Debug, Clone, PartialEq)]
pub struct CmcResults {
    messages: Vec<FetcherMessage>,
    identifier: ResultsIdentifier,
    stats: ResultStats,
}

impl CmcResults {
    pub fn new(
        messages: Vec<FetcherMessage>,
        identifier: ResultsIdentifier,
        stats: ResultStats,
    ) -> Self {
        Self {
            messages,
            identifier,
            stats,
        }
    }

    pub fn messages(&self) -> &[FetcherMessage] {
        &self.messages
    }

    pub fn identifier(&self) -> &ResultsIdentifier {
        &self.identifier
    }

    pub fn stats(&self) -> &ResultStats {
        &self.stats
    }

    /// Encoded length, computed without encoding the envelopes.
    pub fn encoded_len(&self) -> Result<usize, ProtocolError> {
        let envelopes: usize = self.messages.iter().map(FetcherMessage::encoded_len).sum();
        Ok(4 + envelopes + self.identifier.encoded_len() + self.stats.encode()?.len())
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len()?);
        buf.put_u32(wire::length_u32(self.messages.len())?);
        for message in &self.messages {
            buf.put_slice(&message.encode()?);
        }
        self.identifier.encode(&mut buf)?;
        buf.put_slice(&self.stats.encode()?);
        Ok(buf)
    }

    /// Decodes a batch that fills `data` exactly.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (count, mut rest) = wire::read_u32(data)?;
        let mut messages = Vec::new();
        for _ in 0..count {
            let message = FetcherMessage::from_bytes(rest)?;
            rest = wire::split(rest, message.encoded_len())?.1;
            messages.push(message);
        }
        let (identifier, rest) = ResultsIdentifier::decode(rest)?;
        let stats = ResultStats::decode_exact(rest)?;

        tracing::trace!(
            count,
            serial = identifier.serial,
            host = %identifier.host_name,
            "decoded result batch"
        );
        Ok(Self::new(messages, identifier, stats))
    }
}

/// Terminator of a reply stream. Only one instance exists per process.
#[derive(Debug, PartialEq, Eq)]
pub struct EndOfReply {
    header: CmcHeader,
}

static END_OF_REPLY: OnceLock<EndOfReply> = OnceLock::new();

impl EndOfReply {
    /// The shared instance.
    pub fn get() -> &'static EndOfReply {
        END_OF_REPLY.get_or_init(|| EndOfReply {
            header: CmcHeader {
                name: PROTOCOL_NAME.to_string(),
                state: State::EndOfReply,
                log_level: None,
                payload_length: 0,
            },
        })
    }

    pub fn header(&self) -> &CmcHeader {
        &self.header
    }
}

/// A message to or from the monitoring core.
#[derive(Debug, Clone, PartialEq)]
pub enum CmcMessage {
    Results {
        header: CmcHeader,
        results: CmcResults,
    },
    Log {
        header: CmcHeader,
        text: String,
    },
    EndOfReply(&'static EndOfReply),
}

impl CmcMessage {
    /// Builds the reply carrying the results of one fetch cycle.
    pub fn result_answer(
        messages: Vec<FetcherMessage>,
        serial: u32,
        host_name: impl Into<String>,
        timeout: u32,
        duration: Snapshot,
    ) -> Result<Self, ProtocolError> {
        let results = CmcResults::new(
            messages,
            ResultsIdentifier::new(serial, host_name),
            ResultStats::new(timeout, duration),
        );
        let payload_length = results.encoded_len()?;
        Ok(CmcMessage::Results {
            header: CmcHeader::new(PROTOCOL_NAME, State::Result, None, payload_length)?,
            results,
        })
    }

    /// Builds a log line at the given numeric severity.
    pub fn log_answer(text: impl Into<String>, level: u8) -> Result<Self, ProtocolError> {
        let text = text.into();
        let header = CmcHeader::new(
            PROTOCOL_NAME,
            State::Log,
            Some(CmcLogLevel::from_level(level)),
            text.len(),
        )?;
        Ok(CmcMessage::Log { header, text })
    }

    pub fn end_of_reply() -> Self {
        CmcMessage::EndOfReply(EndOfReply::get())
    }

    pub fn header(&self) -> &CmcHeader {
        match self {
            CmcMessage::Results { header, .. } | CmcMessage::Log { header, .. } => header,
            CmcMessage::EndOfReply(end) => end.header(),
        }
    }

    pub fn state(&self) -> State {
        self.header().state()
    }

    /// Encoded length of header and payload.
    pub fn encoded_len(&self) -> usize {
        CMC_HEADER_SIZE + self.header().payload_length()
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header().encode(&mut buf);
        match self {
            CmcMessage::Results { results, .. } => buf.put_slice(&results.encode()?),
            CmcMessage::Log { text, .. } => buf.put_slice(text.as_bytes()),
            CmcMessage::EndOfReply(_) => {}
        }
        Ok(buf)
    }

    /// Decodes one message, ignoring any bytes after its declared payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(data).map_err(|err| {
            tracing::debug!(error = %err, available = data.len(), "rejected core message");
            err
        })
    }

    fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let header = CmcHeader::from_bytes(data)?;
        if header.state() == State::EndOfReply {
            return Ok(Self::end_of_reply());
        }

        let (_, rest) = wire::split(data, CMC_HEADER_SIZE)?;
        let (payload, _) = wire::split(rest, header.payload_length())?;

        match header.state() {
            State::Result => {
                let results = CmcResults::decode(payload)?;
                Ok(CmcMessage::Results { header, results })
            }
            State::Log => {
                let text = std::str::from_utf8(payload)
                    .map_err(|_| ProtocolError::InvalidUtf8)?
                    .to_string();
                Ok(CmcMessage::Log { header, text })
            }
            State::EndOfReply => Ok(Self::end_of_reply()),
        }
    }

    /// The shared terminator, if this is one.
    pub fn as_end_of_reply(&self) -> Option<&'static EndOfReply> {
        match self {
            CmcMessage::EndOfReply(end) => Some(end),
            _ => None,
        }
    }
}
