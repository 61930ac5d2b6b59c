//! Instruction payload decoder.
//!
//! The payload layouts are a fixed wire contract shared with the on-chain
//! programs; the offsets below must be reproduced exactly. All reads go
//! through [`ByteReader`] so a malformed payload surfaces as a typed
//! [`DecodeError`] instead of an out-of-range fault — most instructions on
//! a busy endpoint are not application payloads at all.

use std::fmt;

use sigtail_domain::model::PayloadFormat;
use thiserror::Error;

/// Recoverable-signature header preceding a free-text signed message:
/// 64-byte signature plus 1-byte recovery id.
pub const SIGNED_MESSAGE_HEADER_LEN: usize = 65;

/// Instruction discriminant preceding the structured track payload.
const DISCRIMINANT_LEN: usize = 1;
/// Pad between the first length byte and the start of its field.
const LENGTH_PAD: usize = 3;
/// Gap separating a field from the next field's length byte.
const FIELD_GAP: usize = 4;

/// Typed decode failure; reported to the event sink and skipped, never
/// propagated as a process error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload truncated: offset {expected} exceeds length {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Message extracted from one matching instruction. Produced transiently
/// and emitted inside a [`LedgerEvent`](crate::event::LedgerEvent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// Free-text message anchored behind a recoverable signature.
    SignedText { message: String },
    /// Structured user/track/source payload from the registry program.
    TrackEvent {
        user_id: Vec<u8>,
        track_id: Vec<u8>,
        source: Vec<u8>,
    },
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignedText { message } => write!(f, "message \"{message}\""),
            Self::TrackEvent {
                user_id,
                track_id,
                source,
            } => write!(
                f,
                "user={} track={} source={}",
                render_field(user_id),
                render_field(track_id),
                render_field(source)
            ),
        }
    }
}

/// Renders a raw field as text when printable, hex otherwise.
fn render_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(|c| c.is_ascii_graphic() || c == ' ') => text.to_owned(),
        _ => hex::encode(bytes),
    }
}

/// Bounds-checked reader over an instruction payload. Tracks position and
/// remaining length so every slice bound is a checked operation.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn require(&self, count: usize) -> Result<(), DecodeError> {
        let end = self.pos.saturating_add(count);
        if end > self.data.len() {
            return Err(DecodeError::Truncated {
                expected: end,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.require(count)?;
        self.pos += count;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.require(1)?;
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.require(count)?;
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn rest(self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Decodes the base58 wire form of an instruction's data blob.
pub fn decode_wire_data(data: &str) -> Result<Vec<u8>, DecodeError> {
    bs58::decode(data)
        .into_vec()
        .map_err(|err| DecodeError::InvalidEncoding(format!("instruction data is not base58: {err}")))
}

/// Parses one base58-decoded instruction payload according to `format`.
pub fn decode(data: &[u8], format: PayloadFormat) -> Result<DecodedMessage, DecodeError> {
    match format {
        PayloadFormat::SignedMessage => decode_signed_message(data),
        PayloadFormat::TrackData => decode_track_data(data),
    }
}

fn decode_signed_message(data: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut reader = ByteReader::new(data);
    reader.skip(SIGNED_MESSAGE_HEADER_LEN)?;
    let message = std::str::from_utf8(reader.rest())
        .map_err(|err| DecodeError::InvalidEncoding(format!("message is not UTF-8: {err}")))?
        .to_owned();
    Ok(DecodedMessage::SignedText { message })
}

fn decode_track_data(data: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut reader = ByteReader::new(data);
    reader.skip(DISCRIMINANT_LEN)?;

    // First field: length byte, fixed pad, then the field bytes.
    let user_len = usize::from(reader.read_u8()?);
    reader.skip(LENGTH_PAD)?;
    let user_id = reader.take(user_len)?.to_vec();

    // Remaining fields: fixed gap, length byte, field bytes.
    let track_id = read_gapped_field(&mut reader)?;
    let source = read_gapped_field(&mut reader)?;

    Ok(DecodedMessage::TrackEvent {
        user_id,
        track_id,
        source,
    })
}

fn read_gapped_field(reader: &mut ByteReader<'_>) -> Result<Vec<u8>, DecodeError> {
    reader.skip(FIELD_GAP)?;
    let len = usize::from(reader.read_u8()?);
    Ok(reader.take(len)?.to_vec())
}

/// Mirrors the track payload layout so tests can round-trip arbitrary
/// fields through [`decode`].
#[cfg(test)]
pub(crate) fn encode_track_data(user_id: &[u8], track_id: &[u8], source: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; DISCRIMINANT_LEN];
    buf.push(user_id.len() as u8);
    buf.extend_from_slice(&[0u8; LENGTH_PAD]);
    buf.extend_from_slice(user_id);
    for field in [track_id, source] {
        buf.extend_from_slice(&[0u8; FIELD_GAP]);
        buf.push(field.len() as u8);
        buf.extend_from_slice(field);
    }
    buf
}
