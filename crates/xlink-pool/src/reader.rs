//! Template-id/type-code dispatch reader: determines which concrete
//! message type is present in a byte window without committing to it
//! (`peek_template_id`), and how many bytes a whole framed message needs
//! (`expected_length`), per spec.md §4.C.

use xlink_protocol::{fix, ouch, sbe, FramingError, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateId {
    Fix,
    Ouch(u8),
    Sbe(u16),
}

/// Returns the template id present at the start of `buf` without
/// consuming or validating the rest of the message.
pub fn peek_template_id(protocol: Protocol, buf: &[u8]) -> Result<TemplateId, FramingError> {
    match protocol {
        Protocol::Fix => {
            if buf.is_empty() {
                return Err(FramingError::MalformedLength("empty buffer".into()));
            }
            Ok(TemplateId::Fix)
        }
        Protocol::Ouch => {
            let type_code = *buf
                .first()
                .ok_or_else(|| FramingError::MalformedLength("empty buffer".into()))?;
            Ok(TemplateId::Ouch(type_code))
        }
        Protocol::Sbe => Ok(TemplateId::Sbe(sbe::peek_template_id(buf)?)),
    }
}

/// Returns `Some(total_frame_length)` once enough of `buf` has arrived to
/// know the whole message's length, or `None` if more bytes are needed.
/// OUCH 5.0 appendages are accounted for via `appendage_len`, the number
/// of trailing appendage bytes already known to be present (0 if none).
pub fn expected_length(
    protocol: Protocol,
    buf: &[u8],
    appendage_len: usize,
) -> Result<Option<usize>, FramingError> {
    match protocol {
        Protocol::Fix => fix::expected_length(buf),
        Protocol::Ouch => {
            let Some(&type_code) = buf.first() else {
                return Ok(None);
            };
            Ok(ouch::fixed_length_for(type_code).map(|len| len + appendage_len))
        }
        Protocol::Sbe => Ok(sbe::expected_length_framed(buf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ouch_expected_length_is_none_until_type_byte_present() {
        assert_eq!(expected_length(Protocol::Ouch, &[], 0).unwrap(), None);
    }

    #[test]
    fn sbe_peek_template_id_reads_header_without_consuming() {
        let mut storage = [0u8; 8];
        {
            let mut header = sbe::SbeHeader::wrap(&mut storage).unwrap();
            header.set_template_id(sbe::template_id::NEGOTIATE).unwrap();
        }
        assert_eq!(
            peek_template_id(Protocol::Sbe, &storage).unwrap(),
            TemplateId::Sbe(sbe::template_id::NEGOTIATE)
        );
    }
}
