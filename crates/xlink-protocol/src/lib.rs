//! Wire message flyweights for the three protocol families this engine
//! speaks: tag-based FIX, binary-templated OUCH, and SBE-framed venue
//! protocols (iLink3/Pillar style). Every type wraps a borrowed byte
//! region and never owns its buffer (spec.md §3 Message).

pub mod error;
pub mod fix;
pub mod ouch;
pub mod sbe;

pub use error::FramingError;

/// The protocol family a session or message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Fix,
    Ouch,
    Sbe,
}
