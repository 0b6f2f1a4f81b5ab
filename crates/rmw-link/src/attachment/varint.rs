// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ULEB128 length prefixes used by the attachment framing.
//!
//! Each byte carries 7 data bits, bit 7 flags continuation, least
//! significant group first. A `u64` needs at most 10 bytes.

/// Maximum bytes needed to encode a u64 in ULEB128.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION_BIT: u8 = 0x80;
const DATA_MASK: u8 = 0x7F;

/// Error returned when a length prefix cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Buffer is empty or truncated mid-varint.
    UnexpectedEof,
    /// Varint is too long (overflow for u64).
    Overflow,
}

impl std::fmt::Display for VarintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer while reading varint"),
            Self::Overflow => write!(f, "varint overflow (too many bytes for u64)"),
        }
    }
}

impl std::error::Error for VarintError {}

/// Append `value` to `out` as ULEB128.
#[inline]
pub fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & u64::from(DATA_MASK)) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | CONTINUATION_BIT);
    }
}

/// Decode a ULEB128 varint from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`.
#[inline]
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(VarintError::Overflow);
        }

        let data = u64::from(byte & DATA_MASK);

        // At shift 63 only bit 0 still fits in a u64.
        if shift == 63 && data > 1 {
            return Err(VarintError::Overflow);
        }

        result |= data << shift;

        if byte & CONTINUATION_BIT == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(VarintError::UnexpectedEof)
}

/// Append a length-prefixed byte run.
#[inline]
pub fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Split a length-prefixed byte run off the front of `buf`.
///
/// Returns `(run, rest)`, or `None` when the prefix is malformed or claims
/// more bytes than remain.
#[inline]
pub fn take_prefixed(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, consumed) = decode_varint(buf).ok()?;
    let len = usize::try_from(len).ok()?;
    let body = &buf[consumed..];
    if len > body.len() {
        return None;
    }
    Some(body.split_at(len))
}
