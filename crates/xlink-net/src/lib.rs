//! The single-threaded, non-blocking network event loop (spec.md §4.E):
//! readiness-driven I/O over an `mio` selector, fixed per-channel read/write
//! buffers, and a framing callback the handler owns. The loop itself never
//! allocates per event — only a channel's write backlog (queued because the
//! kernel briefly refused more bytes) grows on demand, the same tradeoff
//! the `gattaca-com-flux` reference TCP stream makes.

mod channel;
mod error;
mod event_loop;

pub use channel::ChannelId;
pub use error::NetError;
pub use event_loop::{EventLoop, Handler};
