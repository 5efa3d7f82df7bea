//! Shared plumbing for the xlink connectivity engine.
//!
//! Every other crate in the workspace depends on this one for the error
//! taxonomy, the injectable clock, identifiers, and the `SessionService`
//! contract external collaborators (the admin server) consume.

pub mod clock;
pub mod error;
pub mod ids;
pub mod service;

pub use clock::{Clock, SystemClock, TestClock};
pub use error::ErrorCode;
pub use ids::{SequenceCounter, SessionId};
pub use service::{ServiceError, SessionEventSink, SessionService, SessionStateEvent};
