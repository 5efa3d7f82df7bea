//! Tag-based FIX 4.x/5.x message flyweights.
//!
//! Unlike OUCH/SBE, FIX fields are not at compile-time-constant byte
//! offsets — the wire format is a sequence of `tag=value<SOH>` pairs of
//! variable width. The flyweight here indexes those pairs by tag at
//! `wrap_for_reading` time so getters are still direct buffer reads, and
//! assembles them in the standard header/body/trailer order at
//! `wrap_for_writing` time so the checksum and body length are computed
//! by a single pass over bytes already in the buffer, never a re-encode.

use crate::error::FramingError;
use std::collections::HashMap;
use std::ops::Range;

pub const SOH: u8 = 0x01;

// Common tag numbers used by the message types this crate models.
pub const TAG_BEGIN_STRING: u32 = 8;
pub const TAG_BODY_LENGTH: u32 = 9;
pub const TAG_MSG_TYPE: u32 = 35;
pub const TAG_SENDER_COMP_ID: u32 = 49;
pub const TAG_TARGET_COMP_ID: u32 = 56;
pub const TAG_MSG_SEQ_NUM: u32 = 34;
pub const TAG_SENDING_TIME: u32 = 52;
pub const TAG_CHECK_SUM: u32 = 10;
pub const TAG_ENCRYPT_METHOD: u32 = 98;
pub const TAG_HEARTBEAT_INT: u32 = 108;
pub const TAG_TEST_REQ_ID: u32 = 112;
pub const TAG_BEGIN_SEQ_NO: u32 = 7;
pub const TAG_END_SEQ_NO: u32 = 16;
pub const TAG_POSS_DUP_FLAG: u32 = 43;
pub const TAG_TEXT: u32 = 58;
pub const TAG_DEFAULT_APPL_VER_ID: u32 = 1137;

/// Message types this workspace models explicitly (spec.md's end-to-end
/// scenarios and session state machine only require these).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMsgType {
    Logon,
    Heartbeat,
    TestRequest,
    ResendRequest,
    SequenceReset,
    Logout,
    Reject,
}

impl FixMsgType {
    pub fn as_str(self) -> &'static str {
        match self {
            FixMsgType::Logon => "A",
            FixMsgType::Heartbeat => "0",
            FixMsgType::TestRequest => "1",
            FixMsgType::ResendRequest => "2",
            FixMsgType::SequenceReset => "4",
            FixMsgType::Logout => "5",
            FixMsgType::Reject => "3",
        }
    }

}

impl std::str::FromStr for FixMsgType {
    type Err = FramingError;

    fn from_str(value: &str) -> Result<Self, FramingError> {
        match value {
            "A" => Ok(FixMsgType::Logon),
            "0" => Ok(FixMsgType::Heartbeat),
            "1" => Ok(FixMsgType::TestRequest),
            "2" => Ok(FixMsgType::ResendRequest),
            "4" => Ok(FixMsgType::SequenceReset),
            "5" => Ok(FixMsgType::Logout),
            "3" => Ok(FixMsgType::Reject),
            other => Err(FramingError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Computes the FIX checksum: the modulo-256 sum of all bytes, zero-padded
/// to 3 ASCII digits.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc + b as u32) % 256)
}

/// Splits `bytes` (one full FIX message, trailer included) into
/// `(tag, value_range)` pairs relative to the start of `bytes`.
fn index_fields(bytes: &[u8]) -> Vec<(u32, Range<usize>)> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let eq = match bytes[pos..].iter().position(|&b| b == b'=') {
            Some(i) => pos + i,
            None => break,
        };
        let soh = match bytes[eq..].iter().position(|&b| b == SOH) {
            Some(i) => eq + i,
            None => break,
        };
        if let Ok(tag_str) = std::str::from_utf8(&bytes[pos..eq]) {
            if let Ok(tag) = tag_str.parse::<u32>() {
                fields.push((tag, eq + 1..soh));
            }
        }
        pos = soh + 1;
    }
    fields
}

/// `expected_length`'s result for tag-based FIX framing: scans for tag 9
/// (body length), then for the trailer, returning the total frame length
/// once the checksum field has fully arrived.
pub fn expected_length(buf: &[u8]) -> Result<Option<usize>, FramingError> {
    let Some(body_len_tag_pos) = find_tag_value(buf, TAG_BODY_LENGTH) else {
        return Ok(None);
    };
    let (body_len_value, value_end) = body_len_tag_pos;
    let body_len: usize = std::str::from_utf8(body_len_value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FramingError::MalformedLength("tag 9 is not a valid integer".into()))?;
    let body_start = value_end + 1;
    let trailer_start = body_start + body_len;
    // Trailer is "10=NNN<SOH>" — 7 bytes.
    let total = trailer_start + 7;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some(total))
}

fn find_tag_value(buf: &[u8], tag: u32) -> Option<(&[u8], usize)> {
    let mut pos = 0;
    while pos < buf.len() {
        let eq = pos + buf[pos..].iter().position(|&b| b == b'=')?;
        let soh = eq + buf[eq..].iter().position(|&b| b == SOH)?;
        let tag_str = std::str::from_utf8(&buf[pos..eq]).ok()?;
        let parsed: u32 = tag_str.parse().ok()?;
        if parsed == tag {
            return Some((&buf[eq + 1..soh], soh));
        }
        pos = soh + 1;
    }
    None
}

/// A FIX message wrapped for reading: an index of `tag -> value range`
/// over a borrowed byte slice. Never owns the bytes it indexes.
#[derive(Debug)]
pub struct FixMessageView<'a> {
    bytes: &'a [u8],
    fields: HashMap<u32, Range<usize>>,
}

impl<'a> FixMessageView<'a> {
    /// Installs a read view over one complete FIX message (header through
    /// trailer) and validates the checksum.
    pub fn wrap_for_reading(bytes: &'a [u8]) -> Result<Self, FramingError> {
        let indexed = index_fields(bytes);
        let checksum_range = indexed
            .iter()
            .find(|(tag, _)| *tag == TAG_CHECK_SUM)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| FramingError::MalformedLength("missing tag 10".into()))?;
        let body_end = checksum_range.start - 3; // back past "10="
        let expected: u32 = std::str::from_utf8(&bytes[checksum_range.clone()])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FramingError::MalformedLength("tag 10 is not numeric".into()))?;
        let computed = checksum(&bytes[..body_end]);
        if expected != computed {
            return Err(FramingError::ChecksumMismatch { expected, computed });
        }
        let fields = indexed.into_iter().collect();
        Ok(FixMessageView { bytes, fields })
    }

    pub fn get_str(&self, tag: u32) -> Option<&'a str> {
        self.fields
            .get(&tag)
            .and_then(|r| std::str::from_utf8(&self.bytes[r.clone()]).ok())
    }

    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get_str(tag).and_then(|s| s.parse().ok())
    }

    pub fn get_bool(&self, tag: u32) -> Option<bool> {
        self.get_str(tag).map(|s| s == "Y")
    }

    pub fn msg_type(&self) -> Result<FixMsgType, FramingError> {
        let raw = self
            .get_str(TAG_MSG_TYPE)
            .ok_or_else(|| FramingError::MalformedLength("missing tag 35".into()))?;
        raw.parse()
    }

    pub fn msg_seq_num(&self) -> Option<u64> {
        self.get_u64(TAG_MSG_SEQ_NUM)
    }

    pub fn poss_dup(&self) -> bool {
        self.get_bool(TAG_POSS_DUP_FLAG).unwrap_or(false)
    }

    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Builds a FIX message for writing: fields are appended in wire order,
/// then `finish` computes body length and checksum and writes the full
/// `8=.../9=.../...body.../10=...` frame into `buf` starting at `offset`.
/// Never reformats a field once appended — only the header/trailer digits
/// are computed in this pass.
pub struct FixMessageBuilder<'a> {
    buf: &'a mut [u8],
    offset: usize,
    begin_string: String,
    body: Vec<u8>,
}

impl<'a> FixMessageBuilder<'a> {
    pub fn new(buf: &'a mut [u8], offset: usize, begin_string: &str, msg_type: FixMsgType) -> Self {
        let mut body = Vec::new();
        push_field(&mut body, TAG_MSG_TYPE, msg_type.as_str());
        FixMessageBuilder {
            buf,
            offset,
            begin_string: begin_string.to_string(),
            body,
        }
    }

    pub fn set_str(&mut self, tag: u32, value: &str) -> &mut Self {
        push_field(&mut self.body, tag, value);
        self
    }

    pub fn set_u64(&mut self, tag: u32, value: u64) -> &mut Self {
        self.set_str(tag, &value.to_string())
    }

    pub fn set_bool(&mut self, tag: u32, value: bool) -> &mut Self {
        self.set_str(tag, if value { "Y" } else { "N" })
    }

    /// Writes the assembled frame into the buffer and returns its total
    /// byte length.
    pub fn finish(&mut self) -> usize {
        let begin_string = self.begin_string.clone();
        let mut header = Vec::new();
        push_field(&mut header, TAG_BEGIN_STRING, &begin_string);
        push_field(&mut header, TAG_BODY_LENGTH, &self.body.len().to_string());

        let mut frame = Vec::with_capacity(header.len() + self.body.len() + 16);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&self.body);
        let sum = checksum(&frame);
        push_field(&mut frame, TAG_CHECK_SUM, &format!("{sum:03}"));

        self.buf[self.offset..self.offset + frame.len()].copy_from_slice(&frame);
        frame.len()
    }
}

fn push_field(buf: &mut Vec<u8>, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logon_round_trips_through_builder_and_view() {
        let mut storage = [0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut storage, 0, "FIX.4.4", FixMsgType::Logon);
        builder
            .set_str(TAG_SENDER_COMP_ID, "CLIENT")
            .set_str(TAG_TARGET_COMP_ID, "SERVER")
            .set_u64(TAG_MSG_SEQ_NUM, 1)
            .set_str(TAG_SENDING_TIME, "20260731-00:00:00")
            .set_u64(TAG_ENCRYPT_METHOD, 0)
            .set_u64(TAG_HEARTBEAT_INT, 30);
        let len = builder.finish();

        let view = FixMessageView::wrap_for_reading(&storage[..len]).unwrap();
        assert_eq!(view.msg_type().unwrap(), FixMsgType::Logon);
        assert_eq!(view.get_str(TAG_SENDER_COMP_ID), Some("CLIENT"));
        assert_eq!(view.get_str(TAG_TARGET_COMP_ID), Some("SERVER"));
        assert_eq!(view.msg_seq_num(), Some(1));
        assert_eq!(view.get_u64(TAG_HEARTBEAT_INT), Some(30));
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let mut storage = [0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut storage, 0, "FIX.4.4", FixMsgType::Heartbeat);
        let len = builder.finish();
        storage[len - 2] = storage[len - 2].wrapping_add(1);
        let err = FixMessageView::wrap_for_reading(&storage[..len]).unwrap_err();
        assert!(matches!(err, FramingError::ChecksumMismatch { .. }));
    }

    #[test]
    fn expected_length_returns_none_until_trailer_arrives() {
        let mut storage = [0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut storage, 0, "FIX.4.4", FixMsgType::Heartbeat);
        let len = builder.finish();
        assert_eq!(expected_length(&storage[..len - 3]).unwrap(), None);
        assert_eq!(expected_length(&storage[..len]).unwrap(), Some(len));
    }
}
