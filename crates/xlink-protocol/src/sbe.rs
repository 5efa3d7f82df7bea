//! SBE-framed message flyweights (CME iLink3 / NYSE Pillar style):
//! an optional 2-byte little-endian frame-length prefix, a fixed SBE
//! message header, then a fixed block plus optional repeating groups.
//!
//! This workspace models the negotiate/establish/terminate messages that
//! gate the SBE session lifecycle (spec.md §4.F); application-level
//! message templates beyond those are out of scope for the same reason
//! spec.md caps FIX/OUCH coverage to the templates its scenarios name.

use crate::error::FramingError;
use xlink_codec::Buffer;

pub const FRAME_LENGTH_PREFIX_LEN: usize = 2;
pub const HEADER_LEN: usize = 8;

pub mod template_id {
    pub const NEGOTIATE: u16 = 500;
    pub const NEGOTIATION_RESPONSE: u16 = 501;
    pub const ESTABLISH: u16 = 502;
    pub const ESTABLISHMENT_ACK: u16 = 503;
    pub const TERMINATE: u16 = 507;
    pub const SEQUENCE: u16 = 34;
}

/// The SBE message header: `block_length:2, template_id:2, schema_id:2,
/// version:2`, all little-endian.
pub struct SbeHeader<'a> {
    buf: Buffer<'a>,
}

impl<'a> SbeHeader<'a> {
    pub fn wrap(data: &'a mut [u8]) -> Result<Self, FramingError> {
        if data.len() < HEADER_LEN {
            return Err(FramingError::MalformedLength(format!(
                "SBE header needs {HEADER_LEN} bytes, had {}",
                data.len()
            )));
        }
        Ok(SbeHeader {
            buf: Buffer::new(data),
        })
    }

    pub fn block_length(&self) -> Result<u16, FramingError> {
        Ok(self.buf.get_u16_le(0)?)
    }

    pub fn set_block_length(&mut self, value: u16) -> Result<&mut Self, FramingError> {
        self.buf.put_u16_le(0, value)?;
        Ok(self)
    }

    pub fn template_id(&self) -> Result<u16, FramingError> {
        Ok(self.buf.get_u16_le(2)?)
    }

    pub fn set_template_id(&mut self, value: u16) -> Result<&mut Self, FramingError> {
        self.buf.put_u16_le(2, value)?;
        Ok(self)
    }

    pub fn schema_id(&self) -> Result<u16, FramingError> {
        Ok(self.buf.get_u16_le(4)?)
    }

    pub fn set_schema_id(&mut self, value: u16) -> Result<&mut Self, FramingError> {
        self.buf.put_u16_le(4, value)?;
        Ok(self)
    }

    pub fn version(&self) -> Result<u16, FramingError> {
        Ok(self.buf.get_u16_le(6)?)
    }

    pub fn set_version(&mut self, value: u16) -> Result<&mut Self, FramingError> {
        self.buf.put_u16_le(6, value)?;
        Ok(self)
    }
}

/// Peeks the template id at `data[0..8]` without committing to a
/// concrete message type — used by the reader's dispatch (§4.C).
pub fn peek_template_id(data: &[u8]) -> Result<u16, FramingError> {
    if data.len() < HEADER_LEN {
        return Err(FramingError::MalformedLength(format!(
            "SBE header needs {HEADER_LEN} bytes, had {}",
            data.len()
        )));
    }
    Ok(u16::from_le_bytes([data[2], data[3]]))
}

/// `expected_length` when a 2-byte little-endian frame-length prefix is in
/// use: total frame = prefix + declared length, or `None` if the prefix
/// itself hasn't arrived yet.
pub fn expected_length_framed(data: &[u8]) -> Option<usize> {
    if data.len() < FRAME_LENGTH_PREFIX_LEN {
        return None;
    }
    let declared = u16::from_le_bytes([data[0], data[1]]) as usize;
    Some(FRAME_LENGTH_PREFIX_LEN + declared)
}

/// Block layout: `session_id:8 BE, flow_type:1`.
pub struct Negotiate<'a> {
    buf: Buffer<'a>,
}

const NEGOTIATE_BLOCK_LEN: usize = 8 + 1;

impl<'a> Negotiate<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut header = SbeHeader::wrap(data)?;
        header.set_block_length(NEGOTIATE_BLOCK_LEN as u16)?;
        header.set_template_id(template_id::NEGOTIATE)?;
        header.set_schema_id(1)?;
        header.set_version(1)?;
        Ok(Negotiate {
            buf: Buffer::new(data),
        })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let tid = peek_template_id(data)?;
        if tid != template_id::NEGOTIATE {
            return Err(FramingError::UnknownMessageType(tid.to_string()));
        }
        Ok(Negotiate {
            buf: Buffer::new(data),
        })
    }

    pub fn message_length(&self) -> usize {
        HEADER_LEN + NEGOTIATE_BLOCK_LEN
    }

    pub fn set_session_id(&mut self, id: u64) -> Result<&mut Self, FramingError> {
        self.buf.put_u64_be(HEADER_LEN, id)?;
        Ok(self)
    }

    pub fn session_id(&self) -> Result<u64, FramingError> {
        Ok(self.buf.get_u64_be(HEADER_LEN)?)
    }

    pub fn set_flow_type(&mut self, value: u8) -> Result<&mut Self, FramingError> {
        self.buf.put_u8(HEADER_LEN + 8, value)?;
        Ok(self)
    }

    pub fn flow_type(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(HEADER_LEN + 8)?)
    }
}

/// Block layout: `request_timestamp:8 BE, status:1`. `status == 0` means
/// accepted.
pub struct EstablishmentAck<'a> {
    buf: Buffer<'a>,
}

const ESTABLISHMENT_ACK_BLOCK_LEN: usize = 8 + 1;

impl<'a> EstablishmentAck<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut header = SbeHeader::wrap(data)?;
        header.set_block_length(ESTABLISHMENT_ACK_BLOCK_LEN as u16)?;
        header.set_template_id(template_id::ESTABLISHMENT_ACK)?;
        header.set_schema_id(1)?;
        header.set_version(1)?;
        Ok(EstablishmentAck {
            buf: Buffer::new(data),
        })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let tid = peek_template_id(data)?;
        if tid != template_id::ESTABLISHMENT_ACK {
            return Err(FramingError::UnknownMessageType(tid.to_string()));
        }
        Ok(EstablishmentAck {
            buf: Buffer::new(data),
        })
    }

    pub fn message_length(&self) -> usize {
        HEADER_LEN + ESTABLISHMENT_ACK_BLOCK_LEN
    }

    pub fn set_status(&mut self, status: u8) -> Result<&mut Self, FramingError> {
        self.buf.put_u8(HEADER_LEN + 8, status)?;
        Ok(self)
    }

    pub fn status(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(HEADER_LEN + 8)?)
    }

    pub fn accepted(&self) -> Result<bool, FramingError> {
        Ok(self.status()? == 0)
    }
}

/// Block layout: `reason_code:1`.
pub struct Terminate<'a> {
    buf: Buffer<'a>,
}

const TERMINATE_BLOCK_LEN: usize = 1;

impl<'a> Terminate<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut header = SbeHeader::wrap(data)?;
        header.set_block_length(TERMINATE_BLOCK_LEN as u16)?;
        header.set_template_id(template_id::TERMINATE)?;
        header.set_schema_id(1)?;
        header.set_version(1)?;
        Ok(Terminate {
            buf: Buffer::new(data),
        })
    }

    pub fn message_length(&self) -> usize {
        HEADER_LEN + TERMINATE_BLOCK_LEN
    }

    pub fn set_reason_code(&mut self, code: u8) -> Result<&mut Self, FramingError> {
        self.buf.put_u8(HEADER_LEN, code)?;
        Ok(self)
    }

    pub fn reason_code(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(HEADER_LEN)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_round_trips_and_header_is_discoverable() {
        let mut storage = [0u8; HEADER_LEN + NEGOTIATE_BLOCK_LEN];
        {
            let mut msg = Negotiate::wrap_for_writing(&mut storage).unwrap();
            msg.set_session_id(42).unwrap();
            msg.set_flow_type(1).unwrap();
        }
        assert_eq!(peek_template_id(&storage).unwrap(), template_id::NEGOTIATE);
        let msg = Negotiate::wrap_for_reading(&mut storage).unwrap();
        assert_eq!(msg.session_id().unwrap(), 42);
        assert_eq!(msg.flow_type().unwrap(), 1);
    }

    #[test]
    fn establishment_ack_reports_acceptance() {
        let mut storage = [0u8; HEADER_LEN + ESTABLISHMENT_ACK_BLOCK_LEN];
        let mut msg = EstablishmentAck::wrap_for_writing(&mut storage).unwrap();
        msg.set_status(0).unwrap();
        assert!(msg.accepted().unwrap());
    }

    #[test]
    fn framed_length_waits_for_prefix() {
        assert_eq!(expected_length_framed(&[0x05]), None);
        assert_eq!(expected_length_framed(&[0x05, 0x00]), Some(7));
    }
}
