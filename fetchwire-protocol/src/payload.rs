//! Result payloads: the outcome of one collection attempt.
//!
//! Every payload frames itself with a 10-byte prefix:
//!
//! ```text
//! +--------------+----------------+----------------------+
//! | payload_type | payload_length | body                 |
//! | 2 bytes      | 8 bytes        | payload_length bytes |
//! +--------------+----------------+----------------------+
//! ```
//!
//! Bodies per type:
//! - `Agent`: the raw agent output, verbatim.
//! - `Snmp`: JSON object mapping section names to tables of strings.
//! - `Error`: JSON object `{"class": <error class>, "args": [...]}`.

use crate::error::ProtocolError;
use crate::wire;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Size of the per-payload prefix (2 + 8).
pub const PAYLOAD_HEADER_SIZE: usize = 10;

/// Kind of payload following the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PayloadType {
    Error = 1,
    Agent = 2,
    Snmp = 3,
}

impl TryFrom<u16> for PayloadType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(PayloadType::Error),
            2 => Ok(PayloadType::Agent),
            3 => Ok(PayloadType::Snmp),
            _ => Err(ProtocolError::UnknownPayloadType(value)),
        }
    }
}

/// Name of an SNMP section, restricted to ASCII letters, digits and `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SectionName(String);

impl SectionName {
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            return Err(ProtocolError::InvalidSectionName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for SectionName {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, ProtocolError> {
        Self::new(value)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One polled table: rows of column values.
pub type SnmpTable = Vec<Vec<String>>;

/// Structured poll result keyed by section.
pub type SnmpRawData = BTreeMap<SectionName, SnmpTable>;

/// Successful outcome of a fetcher run.
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    Agent(Bytes),
    Snmp(SnmpRawData),
}

/// Validated dotted identifier naming an error class outside the known set.
///
/// Names of known classes are rejected, so a `Foreign` kind never aliases a
/// known one on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorClass(String);

impl ErrorClass {
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        let valid = ErrorKind::known(&name).is_none()
            && !name.is_empty()
            && name.split('.').all(|segment| {
                let mut chars = segment.chars();
                matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(ProtocolError::InvalidErrorClass(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Class of a transported error.
///
/// Known classes are reconstructed as their own variant; any other
/// well-formed class name travels as `Foreign` so the receiving side can at
/// least display it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Expected, recoverable collection failure.
    Fetcher,
    Timeout,
    Snmp,
    Io,
    InvalidValue,
    InvalidType,
    MissingKey,
    Runtime,
    Foreign(ErrorClass),
}

impl ErrorKind {
    /// Resolves a wire class name.
    pub fn from_class(name: &str) -> Result<Self, ProtocolError> {
        match Self::known(name) {
            Some(kind) => Ok(kind),
            None => ErrorClass::new(name).map(ErrorKind::Foreign),
        }
    }

    fn known(name: &str) -> Option<Self> {
        Some(match name {
            "FetcherError" => ErrorKind::Fetcher,
            "Timeout" => ErrorKind::Timeout,
            "SnmpError" => ErrorKind::Snmp,
            "IoError" => ErrorKind::Io,
            "ValueError" => ErrorKind::InvalidValue,
            "TypeError" => ErrorKind::InvalidType,
            "KeyError" => ErrorKind::MissingKey,
            "RuntimeError" => ErrorKind::Runtime,
            _ => return None,
        })
    }

    /// Wire class name.
    pub fn class_name(&self) -> &str {
        match self {
            ErrorKind::Fetcher => "FetcherError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Snmp => "SnmpError",
            ErrorKind::Io => "IoError",
            ErrorKind::InvalidValue => "ValueError",
            ErrorKind::InvalidType => "TypeError",
            ErrorKind::MissingKey => "KeyError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::Foreign(class) => class.as_str(),
        }
    }
}

/// An error raised inside a fetcher, carried to the core as class plus
/// constructor arguments. No backtrace is ever attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportedError {
    kind: ErrorKind,
    args: Vec<Value>,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody<'a> {
    #[serde(borrow)]
    class: std::borrow::Cow<'a, str>,
    args: Vec<Value>,
}

impl TransportedError {
    pub fn new(kind: ErrorKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }

    /// Expected collection failure with a single message argument.
    pub fn fetcher(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fetcher, vec![Value::String(message.into())])
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, vec![Value::String(message.into())])
    }

    /// Error of a class outside the known set.
    pub fn foreign(class: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
        Ok(Self::new(ErrorKind::from_class(class)?, args))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Arguments rendered for humans: strings bare, everything else as JSON.
    pub fn message(&self) -> String {
        self.args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn to_body(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = ErrorBody {
            class: self.kind.class_name().into(),
            args: self.args.clone(),
        };
        Ok(serde_json::to_vec(&body)?)
    }

    fn from_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let body: ErrorBody<'_> = serde_json::from_slice(body)?;
        Ok(Self::new(ErrorKind::from_class(&body.class)?, body.args))
    }
}

impl fmt::Display for TransportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(self.kind.class_name())
        } else {
            write!(f, "{}: {}", self.kind.class_name(), self.message())
        }
    }
}

impl std::error::Error for TransportedError {}

impl From<&std::io::Error> for TransportedError {
    fn from(err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, vec![Value::String(err.to_string())])
    }
}

/// One self-framed result payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultMessage {
    Agent(Bytes),
    Snmp(SnmpRawData),
    Error(TransportedError),
}

impl ResultMessage {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            ResultMessage::Agent(_) => PayloadType::Agent,
            ResultMessage::Snmp(_) => PayloadType::Snmp,
            ResultMessage::Error(_) => PayloadType::Error,
        }
    }

    /// Encodes prefix and body.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        match self {
            ResultMessage::Agent(raw) => Ok(frame(PayloadType::Agent, raw)),
            ResultMessage::Snmp(sections) => {
                let body = serde_json::to_vec(sections)?;
                Ok(frame(PayloadType::Snmp, &body))
            }
            ResultMessage::Error(err) => Ok(frame(PayloadType::Error, &err.to_body()?)),
        }
    }

    /// Decodes one payload, reading exactly the declared body length.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_prefix(data).map(|(message, _)| message)
    }

    /// Decodes a region that must hold exactly one payload.
    pub(crate) fn decode_exact(data: &[u8]) -> Result<Self, ProtocolError> {
        let (message, rest) = Self::decode_prefix(data)?;
        wire::ensure_consumed(data, rest)?;
        Ok(message)
    }

    fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (tag, rest) = wire::read_u16(data)?;
        let payload_type = PayloadType::try_from(tag)?;
        let (len, rest) = wire::read_u64(rest)?;
        let (body, rest) = wire::split(rest, wire::declared_len(len))?;

        let message = match payload_type {
            PayloadType::Agent => ResultMessage::Agent(Bytes::copy_from_slice(body)),
            PayloadType::Snmp => ResultMessage::Snmp(decode_sections(body)?),
            PayloadType::Error => ResultMessage::Error(TransportedError::from_body(body)?),
        };
        Ok((message, rest))
    }

    /// The outcome as a `Result`, whatever kind of payload was received.
    pub fn result(&self) -> Result<RawData, TransportedError> {
        self.clone().into_result()
    }

    pub fn into_result(self) -> Result<RawData, TransportedError> {
        match self {
            ResultMessage::Agent(raw) => Ok(RawData::Agent(raw)),
            ResultMessage::Snmp(sections) => Ok(RawData::Snmp(sections)),
            ResultMessage::Error(err) => Err(err),
        }
    }
}

impl From<RawData> for ResultMessage {
    fn from(raw: RawData) -> Self {
        match raw {
            RawData::Agent(raw) => ResultMessage::Agent(raw),
            RawData::Snmp(sections) => ResultMessage::Snmp(sections),
        }
    }
}

fn frame(payload_type: PayloadType, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(PAYLOAD_HEADER_SIZE + body.len());
    buf.put_u16(payload_type as u16);
    buf.put_u64(body.len() as u64);
    buf.put_slice(body);
    buf
}

fn decode_sections(body: &[u8]) -> Result<SnmpRawData, ProtocolError> {
    let raw: BTreeMap<String, SnmpTable> = serde_json::from_slice(body)?;
    raw.into_iter()
        .map(|(name, table)| Ok((SectionName::new(name)?, table)))
        .collect()
}
