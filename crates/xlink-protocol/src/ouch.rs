//! NASDAQ OUCH 4.2/5.0 message flyweights: fixed-layout binary bodies
//! keyed by a single leading message-type byte, with compile-time-constant
//! field offsets. OUCH 5.0 appendages are an optional trailing
//! tag-length-value chain.

use crate::error::FramingError;
use xlink_codec::Buffer;

pub const PRICE_SCALE: u32 = 4;

pub mod msg_type {
    pub const ENTER_ORDER: u8 = b'O';
    pub const ORDER_ACCEPTED: u8 = b'A';
    pub const ORDER_REJECTED: u8 = b'J';
    pub const REPLACE_ORDER: u8 = b'U';
    /// Shared by inbound `MODIFY_ORDER` and outbound `ORDER_MODIFIED`; see
    /// [`OrderModifyDirection`].
    pub const MODIFY_ORDER_OR_MODIFIED: u8 = b'M';
    pub const CANCEL_ORDER: u8 = b'X';
    pub const LOGIN_REQUEST: u8 = b'L';
    pub const LOGIN_ACCEPTED: u8 = b'A';
    pub const LOGIN_REJECTED: u8 = b'J';
}

/// OUCH's `'M'` type code is shared between the inbound `ModifyOrder`
/// request and the outbound `OrderModified` notification; the reader must
/// be told which direction it is parsing since the wire layout cannot
/// disambiguate the two on its own (spec.md §9, Open Question a).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderModifyDirection {
    Inbound,
    Outbound,
}

/// Fixed layout: `type:1, token:14 (alpha), side:1, shares:4 BE,
/// symbol:8 (alpha), price:4 BE (x10^4), time_in_force:4 BE`.
pub struct EnterOrder<'a> {
    buf: Buffer<'a>,
}

const ENTER_ORDER_LEN: usize = 1 + 14 + 1 + 4 + 8 + 4 + 4;

impl<'a> EnterOrder<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut buf = Buffer::new(data);
        buf.put_u8(0, msg_type::ENTER_ORDER)?;
        Ok(EnterOrder { buf })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let buf = Buffer::new(data);
        let got = buf.get_u8(0)?;
        if got != msg_type::ENTER_ORDER {
            return Err(FramingError::UnknownMessageType(format!("{got:#x}")));
        }
        Ok(EnterOrder { buf })
    }

    pub fn message_type(&self) -> u8 {
        msg_type::ENTER_ORDER
    }

    pub fn message_length(&self) -> usize {
        ENTER_ORDER_LEN
    }

    pub fn set_token(&mut self, token: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(1, 14, token)?;
        Ok(self)
    }

    pub fn token(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(1, 14)?)
    }

    pub fn set_side(&mut self, side: u8) -> Result<&mut Self, FramingError> {
        self.buf.put_u8(15, side)?;
        Ok(self)
    }

    pub fn side(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(15)?)
    }

    pub fn set_shares(&mut self, shares: u32) -> Result<&mut Self, FramingError> {
        self.buf.put_u32_be(16, shares)?;
        Ok(self)
    }

    pub fn shares(&self) -> Result<u32, FramingError> {
        Ok(self.buf.get_u32_be(16)?)
    }

    pub fn set_symbol(&mut self, symbol: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(20, 8, symbol)?;
        Ok(self)
    }

    pub fn symbol(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(20, 8)?)
    }

    pub fn set_price(&mut self, price: f64) -> Result<&mut Self, FramingError> {
        self.buf.put_price_i32_be(28, price, PRICE_SCALE)?;
        Ok(self)
    }

    pub fn price(&self) -> Result<f64, FramingError> {
        Ok(self.buf.get_price_i32_be(28, PRICE_SCALE)?)
    }

    pub fn set_time_in_force(&mut self, tif: u32) -> Result<&mut Self, FramingError> {
        self.buf.put_u32_be(32, tif)?;
        Ok(self)
    }

    pub fn time_in_force(&self) -> Result<u32, FramingError> {
        Ok(self.buf.get_u32_be(32)?)
    }
}

/// Fixed layout: `type:1, token:14 (alpha)`.
pub struct OrderAccepted<'a> {
    buf: Buffer<'a>,
}

const ORDER_ACCEPTED_LEN: usize = 1 + 14;

impl<'a> OrderAccepted<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut buf = Buffer::new(data);
        buf.put_u8(0, msg_type::ORDER_ACCEPTED)?;
        Ok(OrderAccepted { buf })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let buf = Buffer::new(data);
        let got = buf.get_u8(0)?;
        if got != msg_type::ORDER_ACCEPTED {
            return Err(FramingError::UnknownMessageType(format!("{got:#x}")));
        }
        Ok(OrderAccepted { buf })
    }

    pub fn message_length(&self) -> usize {
        ORDER_ACCEPTED_LEN
    }

    pub fn set_token(&mut self, token: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(1, 14, token)?;
        Ok(self)
    }

    pub fn token(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(1, 14)?)
    }
}

/// Fixed layout: `type:1, username:6 (alpha), password:10 (alpha),
/// session:10 (alpha), sequence:8 BE`.
pub struct LoginRequest<'a> {
    buf: Buffer<'a>,
}

const LOGIN_REQUEST_LEN: usize = 1 + 6 + 10 + 10 + 8;

impl<'a> LoginRequest<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut buf = Buffer::new(data);
        buf.put_u8(0, msg_type::LOGIN_REQUEST)?;
        Ok(LoginRequest { buf })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let buf = Buffer::new(data);
        let got = buf.get_u8(0)?;
        if got != msg_type::LOGIN_REQUEST {
            return Err(FramingError::UnknownMessageType(format!("{got:#x}")));
        }
        Ok(LoginRequest { buf })
    }

    pub fn message_length(&self) -> usize {
        LOGIN_REQUEST_LEN
    }

    pub fn set_username(&mut self, username: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(1, 6, username)?;
        Ok(self)
    }

    pub fn username(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(1, 6)?)
    }

    pub fn set_password(&mut self, password: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(7, 10, password)?;
        Ok(self)
    }

    pub fn password(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(7, 10)?)
    }

    pub fn set_session(&mut self, session: &str) -> Result<&mut Self, FramingError> {
        self.buf.put_alpha(17, 10, session)?;
        Ok(self)
    }

    pub fn session(&self) -> Result<&str, FramingError> {
        Ok(self.buf.get_alpha(17, 10)?)
    }

    pub fn set_sequence(&mut self, seq: u64) -> Result<&mut Self, FramingError> {
        self.buf.put_u64_be(27, seq)?;
        Ok(self)
    }

    pub fn sequence(&self) -> Result<u64, FramingError> {
        Ok(self.buf.get_u64_be(27)?)
    }
}

/// Fixed layout: `type:1, reason_len:1`. `'A'` for accepted.
pub struct LoginAccepted<'a> {
    buf: Buffer<'a>,
}

impl<'a> LoginAccepted<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut buf = Buffer::new(data);
        buf.put_u8(0, msg_type::LOGIN_ACCEPTED)?;
        Ok(LoginAccepted { buf })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let buf = Buffer::new(data);
        let got = buf.get_u8(0)?;
        if got != msg_type::LOGIN_ACCEPTED {
            return Err(FramingError::UnknownMessageType(format!("{got:#x}")));
        }
        Ok(LoginAccepted { buf })
    }

    pub fn message_length(&self) -> usize {
        1
    }

    pub fn message_type(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(0)?)
    }
}

/// Fixed layout: `type:1, reason:1`.
pub struct LoginRejected<'a> {
    buf: Buffer<'a>,
}

impl<'a> LoginRejected<'a> {
    pub fn wrap_for_writing(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let mut buf = Buffer::new(data);
        buf.put_u8(0, msg_type::LOGIN_REJECTED)?;
        Ok(LoginRejected { buf })
    }

    pub fn wrap_for_reading(data: &'a mut [u8]) -> Result<Self, FramingError> {
        let buf = Buffer::new(data);
        let got = buf.get_u8(0)?;
        if got != msg_type::LOGIN_REJECTED {
            return Err(FramingError::UnknownMessageType(format!("{got:#x}")));
        }
        Ok(LoginRejected { buf })
    }

    pub fn message_length(&self) -> usize {
        2
    }

    pub fn set_reason(&mut self, reason: u8) -> Result<&mut Self, FramingError> {
        self.buf.put_u8(1, reason)?;
        Ok(self)
    }

    pub fn reason(&self) -> Result<u8, FramingError> {
        Ok(self.buf.get_u8(1)?)
    }
}

/// Per-type fixed lengths used by the reader's `expected_length` (without
/// appendages; OUCH 5.0 appendage bytes are added on top when present).
pub fn fixed_length_for(message_type: u8) -> Option<usize> {
    match message_type {
        msg_type::ENTER_ORDER => Some(ENTER_ORDER_LEN),
        msg_type::ORDER_ACCEPTED => Some(ORDER_ACCEPTED_LEN),
        msg_type::LOGIN_REQUEST => Some(LOGIN_REQUEST_LEN),
        _ => None,
    }
}

/// One decoded OUCH 5.0 appendage TLV: `(tag:1, length:2 BE, data)`.
pub struct Appendage<'a> {
    pub tag: u8,
    pub data: &'a [u8],
}

/// Walks the tag-length-value appendage chain starting at `data`,
/// returning an error if a declared length runs past the available bytes.
pub fn parse_appendages(data: &[u8]) -> Result<Vec<Appendage<'_>>, FramingError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + 3 > data.len() {
            return Err(FramingError::TruncatedAppendage {
                expected: 3,
                available: data.len() - pos,
            });
        }
        let tag = data[pos];
        let len = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
        let value_start = pos + 3;
        if value_start + len > data.len() {
            return Err(FramingError::TruncatedAppendage {
                expected: len,
                available: data.len() - value_start,
            });
        }
        out.push(Appendage {
            tag,
            data: &data[value_start..value_start + len],
        });
        pos = value_start + len;
    }
    Ok(out)
}
