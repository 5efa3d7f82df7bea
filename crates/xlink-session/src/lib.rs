//! Session state machines (spec.md §4.F): one type per protocol family,
//! each turning inbound bytes, timer ticks, and scheduler events into
//! outbound intents. None of these own a socket or a log file — the
//! engine's per-channel driver wires a session to `xlink-net` for I/O,
//! `xlink-log` for persistence, and `xlink-scheduler` for EOD/session
//! windows.

mod error;
mod fix_session;
mod ouch_session;
mod sbe_session;
mod state;

pub use error::SessionError;
pub use fix_session::{FixAction, FixSession, FixSessionConfig};
pub use ouch_session::{OuchAction, OuchSession, OuchSessionConfig};
pub use sbe_session::{SbeAction, SbeSession, SbeSessionConfig};
pub use state::SessionState;
