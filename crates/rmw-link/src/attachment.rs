// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-message attachment codec.
//!
//! Every transport message may carry an attachment: an ordered list of
//! `(key, value)` pairs packed into one opaque buffer. The receive path reads
//! sender identity ([`extract_gid`]) and counters ([`extract_int64`]) from it.
//!
//! # Wire Format
//!
//! ```text
//! attachment := element*
//! element    := uleb128(len) pair[len]
//! pair       := uleb128(klen) key[klen] uleb128(vlen) value[vlen]
//! ```
//!
//! Keys are UTF-8. Values are raw bytes whose meaning is fixed by the key
//! name only: `source_gid` carries 16 raw bytes, counters carry decimal text.
//! Duplicate keys are legal; lookups take the first one in producer order.
//!
//! Malformed input never panics. A truncated element ends iteration, a pair
//! whose body does not decode is skipped, and every extraction failure is an
//! absent value.

mod varint;

use varint::{put_prefixed, take_prefixed};

/// Size of an endpoint global identifier in bytes.
pub const GID_STORAGE_SIZE: usize = 16;

/// Endpoint global identifier.
pub type Gid = [u8; GID_STORAGE_SIZE];

/// Key carrying the publisher sequence number.
pub const SEQUENCE_NUMBER_KEY: &str = "sequence_number";
/// Key carrying the source timestamp (nanoseconds).
pub const SOURCE_TIMESTAMP_KEY: &str = "source_timestamp";
/// Key carrying the sender [`Gid`].
pub const SOURCE_GID_KEY: &str = "source_gid";

/// Longest decimal rendering of `i64::MAX` ("9223372036854775807").
pub const MAX_INT64_DIGITS: usize = 19;

/// Value returned by [`extract_int64`] for every failure.
pub const INT64_SENTINEL: i64 = -1;

/// Owned, encoded attachment buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attachment {
    buf: Vec<u8>,
}

impl Attachment {
    /// Empty attachment (no pairs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already encoded buffer (e.g. received from the transport).
    #[must_use]
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Append a pair, keeping producer order.
    pub fn push(&mut self, key: &str, value: &[u8]) {
        let mut pair = Vec::with_capacity(key.len() + value.len() + 4);
        put_prefixed(&mut pair, key.as_bytes());
        put_prefixed(&mut pair, value);
        put_prefixed(&mut self.buf, &pair);
    }

    /// Builder-style [`Attachment::push`].
    #[must_use]
    pub fn with(mut self, key: &str, value: &[u8]) -> Self {
        self.push(key, value);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Iterate the decodable pairs in producer order.
    pub fn pairs(&self) -> Pairs<'_> {
        pairs(&self.buf)
    }
}

impl AsRef<[u8]> for Attachment {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

/// One decoded `(key, value)` pair borrowed from an attachment buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pair<'a> {
    pub key: &'a str,
    pub value: &'a [u8],
}

/// Iterator over the pairs of an encoded attachment.
#[derive(Clone, Debug)]
pub struct Pairs<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Pairs<'a> {
    type Item = Pair<'a>;

    fn next(&mut self) -> Option<Pair<'a>> {
        while !self.rest.is_empty() {
            let Some((element, rest)) = take_prefixed(self.rest) else {
                // Outer framing is broken: nothing after this point can be trusted.
                self.rest = &[];
                return None;
            };
            self.rest = rest;
            if let Some(pair) = decode_pair(element) {
                return Some(pair);
            }
        }
        None
    }
}

impl std::iter::FusedIterator for Pairs<'_> {}

fn decode_pair(element: &[u8]) -> Option<Pair<'_>> {
    let (key, rest) = take_prefixed(element)?;
    let (value, rest) = take_prefixed(rest)?;
    if !rest.is_empty() {
        return None;
    }
    let key = std::str::from_utf8(key).ok()?;
    Some(Pair { key, value })
}

/// Iterate the pairs of an encoded attachment buffer.
pub fn pairs(attachment: &[u8]) -> Pairs<'_> {
    Pairs { rest: attachment }
}

/// Find the value of the first pair whose key equals `key`.
///
/// Fails on an empty attachment, when no pair matches, and when the first
/// matching value is empty. Later duplicates are never inspected.
#[must_use]
pub fn lookup<'a>(attachment: &'a [u8], key: &str) -> Option<&'a [u8]> {
    if attachment.is_empty() {
        return None;
    }

    let value = pairs(attachment)
        .find(|pair| pair.key.as_bytes() == key.as_bytes())?
        .value;

    if value.is_empty() {
        return None;
    }
    Some(value)
}

/// Read the sender [`Gid`] from the `source_gid` pair.
///
/// A present value of any length other than [`GID_STORAGE_SIZE`] is a
/// failure, never a truncation.
#[must_use]
pub fn extract_gid(attachment: &[u8]) -> Option<Gid> {
    if attachment.is_empty() {
        return None;
    }

    let value = lookup(attachment, SOURCE_GID_KEY)?;
    match Gid::try_from(value) {
        Ok(gid) => Some(gid),
        Err(_) => {
            log::debug!(
                "[attachment] GID length mismatched: expected {} bytes, got {}",
                GID_STORAGE_SIZE,
                value.len()
            );
            None
        }
    }
}

/// Why an integer could not be read from an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Int64Error {
    /// Attachment empty, key absent, or value empty.
    #[error("no value for key")]
    Missing,
    /// Value is not a decimal integer (bad UTF-8, junk, no digits).
    #[error("value is not a decimal integer")]
    Malformed,
    /// Value is longer than 19 characters or overflows `i64`.
    #[error("value out of range")]
    OutOfRange,
    /// Value parsed as exactly zero, which no sender is allowed to emit.
    #[error("value is zero")]
    Zero,
}

/// Typed counterpart of [`extract_int64`].
///
/// Length is gated to `1..=19` bytes before parsing. Parsing accepts leading
/// whitespace and an optional sign, then requires every remaining byte to be
/// a digit. A literal zero is reported as [`Int64Error::Zero`].
pub fn read_int64(attachment: &[u8], key: &str) -> Result<i64, Int64Error> {
    let value = lookup(attachment, key).ok_or(Int64Error::Missing)?;
    if value.len() > MAX_INT64_DIGITS {
        return Err(Int64Error::OutOfRange);
    }

    let text = std::str::from_utf8(value).map_err(|_| Int64Error::Malformed)?;
    let digits = text.trim_start_matches(is_c_space);

    let num = digits.parse::<i64>().map_err(|err| match err.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            Int64Error::OutOfRange
        }
        _ => Int64Error::Malformed,
    })?;

    if num == 0 {
        return Err(Int64Error::Zero);
    }
    Ok(num)
}

/// Read a decimal integer stored under `key`.
///
/// Returns [`INT64_SENTINEL`] (`-1`) when the attachment is empty, the key is
/// missing, the text is malformed or out of range, and also when the value is
/// literally `0`. Use [`read_int64`] to tell those cases apart.
#[must_use]
pub fn extract_int64(attachment: &[u8], key: &str) -> i64 {
    if attachment.is_empty() {
        return INT64_SENTINEL;
    }

    match read_int64(attachment, key) {
        Ok(num) => num,
        Err(err) => {
            log::debug!("[attachment] failed to read int64 '{}': {}", key, err);
            INT64_SENTINEL
        }
    }
}

fn is_c_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
}

/// Metadata every published message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentData {
    pub sequence_number: i64,
    pub source_timestamp: i64,
    pub source_gid: Gid,
}

impl AttachmentData {
    #[must_use]
    pub fn new(sequence_number: i64, source_timestamp: i64, source_gid: Gid) -> Self {
        Self {
            sequence_number,
            source_timestamp,
            source_gid,
        }
    }

    /// Encode as `sequence_number`, `source_timestamp`, `source_gid`, in that
    /// order. Counters go out as decimal text, the GID as raw bytes.
    #[must_use]
    pub fn to_attachment(&self) -> Attachment {
        Attachment::new()
            .with(
                SEQUENCE_NUMBER_KEY,
                self.sequence_number.to_string().as_bytes(),
            )
            .with(
                SOURCE_TIMESTAMP_KEY,
                self.source_timestamp.to_string().as_bytes(),
            )
            .with(SOURCE_GID_KEY, &self.source_gid)
    }

    /// Decode the three well-known pairs. Any missing or invalid field fails
    /// the whole decode.
    #[must_use]
    pub fn from_attachment(attachment: &[u8]) -> Option<Self> {
        let source_gid = extract_gid(attachment)?;
        let sequence_number = read_int64(attachment, SEQUENCE_NUMBER_KEY).ok()?;
        let source_timestamp = read_int64(attachment, SOURCE_TIMESTAMP_KEY).ok()?;
        Some(Self {
            sequence_number,
            source_timestamp,
            source_gid,
        })
    }
}
