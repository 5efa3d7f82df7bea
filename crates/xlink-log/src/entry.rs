//! The on-disk entry layout: a 4-byte length prefix followed by
//! `(timestamp:8, seq:4, direction:1, txn_id:8, msg_type_len:2,
//! msg_type_bytes, metadata_len:2, metadata_bytes, raw_len:4, raw_bytes)`.
//! Raw bytes are retained verbatim (not a re-encoded structured form), so
//! replay is byte-identical to the original wire transmission.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Direction::In => 0,
            Direction::Out => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Direction::In),
            1 => Some(Direction::Out),
            _ => None,
        }
    }
}

/// An entry to be appended, borrowing its variable-length fields.
pub struct LogEntry<'a> {
    pub timestamp_nanos: i64,
    pub seq: u32,
    pub direction: Direction,
    pub txn_id: u64,
    pub msg_type: &'a str,
    pub metadata: &'a [u8],
    pub raw: &'a [u8],
}

impl<'a> LogEntry<'a> {
    /// Total on-disk size including the 4-byte length prefix, matching
    /// `4 + 8 + 4 + 1 + 8 + 2 + |msg_type| + 2 + |metadata| + 4 + |raw|`.
    pub fn on_disk_len(&self) -> usize {
        4 + 8 + 4 + 1 + 8 + 2 + self.msg_type.len() + 2 + self.metadata.len() + 4 + self.raw.len()
    }

    pub(crate) fn encode_into(&self, out: &mut [u8]) {
        let body_len = (self.on_disk_len() - 4) as u32;
        let mut pos = 0;
        out[pos..pos + 4].copy_from_slice(&body_len.to_le_bytes());
        pos += 4;
        out[pos..pos + 8].copy_from_slice(&self.timestamp_nanos.to_le_bytes());
        pos += 8;
        out[pos..pos + 4].copy_from_slice(&self.seq.to_le_bytes());
        pos += 4;
        out[pos] = self.direction.to_byte();
        pos += 1;
        out[pos..pos + 8].copy_from_slice(&self.txn_id.to_le_bytes());
        pos += 8;
        out[pos..pos + 2].copy_from_slice(&(self.msg_type.len() as u16).to_le_bytes());
        pos += 2;
        out[pos..pos + self.msg_type.len()].copy_from_slice(self.msg_type.as_bytes());
        pos += self.msg_type.len();
        out[pos..pos + 2].copy_from_slice(&(self.metadata.len() as u16).to_le_bytes());
        pos += 2;
        out[pos..pos + self.metadata.len()].copy_from_slice(self.metadata);
        pos += self.metadata.len();
        out[pos..pos + 4].copy_from_slice(&(self.raw.len() as u32).to_le_bytes());
        pos += 4;
        out[pos..pos + self.raw.len()].copy_from_slice(self.raw);
    }
}

/// A decoded entry borrowing directly from the memory-mapped file.
#[derive(Debug, Clone, Copy)]
pub struct ParsedEntry<'a> {
    pub timestamp_nanos: i64,
    pub seq: u32,
    pub direction: Direction,
    pub txn_id: u64,
    pub msg_type: &'a str,
    pub metadata: &'a [u8],
    pub raw: &'a [u8],
    /// Total bytes this entry occupies on disk, including its prefix.
    pub on_disk_len: usize,
}

/// Decodes one entry starting at `data[0]`. Returns the entry and its
/// total on-disk length (prefix included).
pub fn decode(data: &[u8]) -> Option<ParsedEntry<'_>> {
    if data.len() < 4 {
        return None;
    }
    let body_len = u32::from_le_bytes(data[0..4].try_into().ok()?) as usize;
    if data.len() < 4 + body_len {
        return None;
    }
    let mut pos = 4;
    let timestamp_nanos = i64::from_le_bytes(data[pos..pos + 8].try_into().ok()?);
    pos += 8;
    let seq = u32::from_le_bytes(data[pos..pos + 4].try_into().ok()?);
    pos += 4;
    let direction = Direction::from_byte(data[pos])?;
    pos += 1;
    let txn_id = u64::from_le_bytes(data[pos..pos + 8].try_into().ok()?);
    pos += 8;
    let msg_type_len = u16::from_le_bytes(data[pos..pos + 2].try_into().ok()?) as usize;
    pos += 2;
    let msg_type = std::str::from_utf8(&data[pos..pos + msg_type_len]).ok()?;
    pos += msg_type_len;
    let metadata_len = u16::from_le_bytes(data[pos..pos + 2].try_into().ok()?) as usize;
    pos += 2;
    let metadata = &data[pos..pos + metadata_len];
    pos += metadata_len;
    let raw_len = u32::from_le_bytes(data[pos..pos + 4].try_into().ok()?) as usize;
    pos += 4;
    let raw = &data[pos..pos + raw_len];
    pos += raw_len;

    Some(ParsedEntry {
        timestamp_nanos,
        seq,
        direction,
        txn_id,
        msg_type,
        metadata,
        raw,
        on_disk_len: pos,
    })
}
