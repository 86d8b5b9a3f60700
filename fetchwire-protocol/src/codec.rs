//! Buffering decoder for core messages read off a pipe.

use crate::cmc::{CmcHeader, CmcMessage, CMC_HEADER_SIZE};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// Accumulates bytes and yields complete core messages.
///
/// A read may deliver part of a message or several messages at once; the
/// decoder keeps whatever it cannot decode yet for the next call.
pub struct CmcDecoder {
    buffer: BytesMut,
}

impl CmcDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. On error the offending
    /// message is dropped from the buffer when its boundary is known, so a
    /// caller may keep reading subsequent messages. A header that does not
    /// parse, or declares more than [`MAX_PAYLOAD_SIZE`](crate::MAX_PAYLOAD_SIZE)
    /// bytes, leaves the stream unusable.
    pub fn decode_message(&mut self) -> Result<Option<CmcMessage>, ProtocolError> {
        if self.buffer.len() < CMC_HEADER_SIZE {
            return Ok(None);
        }

        let header = CmcHeader::from_bytes(&self.buffer)?;
        let total_len = CMC_HEADER_SIZE + header.payload_length();
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let result = CmcMessage::from_bytes(&self.buffer[..total_len]);
        self.buffer.advance(total_len);
        result.map(Some)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for CmcDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmc::State;
    use crate::fetcher::{FetcherMessage, FetcherType};
    use crate::payload::RawData;
    use crate::stats::Snapshot;

    fn reply_stream() -> Vec<u8> {
        let fetched = FetcherMessage::from_raw_data(
            Ok(RawData::Agent(Bytes::from_static(b"<<<df>>>\n/ 100 50\n"))),
            Snapshot::null(),
            FetcherType::Tcp,
        )
        .unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&CmcMessage::log_answer("fetching", 20).unwrap().encode().unwrap());
        data.extend_from_slice(
            &CmcMessage::result_answer(vec![fetched], 3, "myhost", 60, Snapshot::null())
                .unwrap()
                .encode()
                .unwrap(),
        );
        data.extend_from_slice(&CmcMessage::end_of_reply().encode().unwrap());
        data
    }

    #[test]
    fn test_decode_stream_in_one_read() {
        let mut decoder = CmcDecoder::new();
        decoder.extend(&reply_stream());

        let states: Vec<State> = std::iter::from_fn(|| decoder.decode_message().unwrap())
            .map(|msg| msg.state())
            .collect();
        assert_eq!(states, vec![State::Log, State::Result, State::EndOfReply]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_stream_byte_by_byte() {
        let data = reply_stream();
        let mut decoder = CmcDecoder::new();
        let mut decoded = Vec::new();

        for byte in data {
            decoder.extend(&[byte]);
            if let Some(msg) = decoder.decode_message().unwrap() {
                decoded.push(msg);
            }
        }

        assert_eq!(decoded.len(), 3);
        assert!(decoded[2].as_end_of_reply().is_some());
    }

    #[test]
    fn test_partial_header_needs_more_data() {
        let mut decoder = CmcDecoder::new();
        decoder.extend(b"fetch:LOG    :");
        assert!(decoder.decode_message().unwrap().is_none());
        assert_eq!(decoder.buffered(), 14);
    }

    #[test]
    fn test_corrupt_message_is_skipped() {
        let mut decoder = CmcDecoder::new();
        // Declares a 3-byte result payload that cannot be a valid batch.
        decoder.extend(b"fetch:RESULT :        :3               :abc");
        decoder.extend_bytes(CmcMessage::end_of_reply().encode().unwrap().freeze());

        assert!(decoder.decode_message().is_err());
        let next = decoder.decode_message().unwrap().unwrap();
        assert!(next.as_end_of_reply().is_some());
    }

    #[test]
    fn test_oversized_message_is_rejected_before_buffering() {
        let mut decoder = CmcDecoder::new();
        decoder.extend(b"fetch:RESULT :        :9999999999999999:");
        decoder.extend(&[0u8; 1024]);

        let result = decoder.decode_message();
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { max, .. }) if max == crate::MAX_PAYLOAD_SIZE
        ));
    }

    #[test]
    fn test_clear_and_default() {
        let mut decoder = CmcDecoder::default();
        decoder.extend(b"some data");
        assert_eq!(decoder.buffered(), 9);
        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
