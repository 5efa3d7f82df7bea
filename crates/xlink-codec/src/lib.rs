//! Endianness-aware flyweight buffer primitives shared by every wire codec
//! in the workspace: fixed-width integers, padded ASCII, and the
//! fixed-point decimal scaling OUCH, Pillar, and Optiq prices share.

pub mod buffer;
pub mod error;

pub use buffer::Buffer;
pub use error::CodecError;
