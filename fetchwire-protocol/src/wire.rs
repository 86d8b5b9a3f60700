//! Bounds-checked big-endian readers shared by the decoders.
//!
//! Every reader returns the value together with the unread remainder, so
//! decoders thread a `&[u8]` cursor through a sequence of fields and never
//! touch bytes past the lengths they were told about.

use crate::error::ProtocolError;
use bytes::Buf;

/// Splits off exactly `len` bytes from the front of `data`.
pub(crate) fn split(data: &[u8], len: usize) -> Result<(&[u8], &[u8]), ProtocolError> {
    if data.len() < len {
        return Err(ProtocolError::Truncated {
            needed: len,
            available: data.len(),
        });
    }
    Ok(data.split_at(len))
}

pub(crate) fn read_u16(data: &[u8]) -> Result<(u16, &[u8]), ProtocolError> {
    let (mut head, rest) = split(data, 2)?;
    Ok((head.get_u16(), rest))
}

pub(crate) fn read_u32(data: &[u8]) -> Result<(u32, &[u8]), ProtocolError> {
    let (mut head, rest) = split(data, 4)?;
    Ok((head.get_u32(), rest))
}

pub(crate) fn read_u64(data: &[u8]) -> Result<(u64, &[u8]), ProtocolError> {
    let (mut head, rest) = split(data, 8)?;
    Ok((head.get_u64(), rest))
}

/// Converts a body length into a 4-byte length field.
pub(crate) fn length_u32(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Fails unless a decoder used every byte of a length-delimited region.
pub(crate) fn ensure_consumed(region: &[u8], rest: &[u8]) -> Result<(), ProtocolError> {
    if !rest.is_empty() {
        return Err(ProtocolError::LengthMismatch {
            declared: region.len(),
            used: region.len() - rest.len(),
        });
    }
    Ok(())
}

/// Converts a declared wire length into an in-memory length. Lengths that do
/// not fit saturate, so the following `split` reports them as truncated.
pub(crate) fn declared_len(len: u64) -> usize {
    usize::try_from(len).unwrap_or(usize::MAX)
}
