//! Identity utilities: session identifiers and claim sequence numbers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A session's configured identity, e.g. `"CLIENT->SERVER"` for FIX or a
/// forwarder/reader pair for OUCH/SBE sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        SessionId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process-wide monotonically increasing counter, used for ring-buffer
/// claim sequence numbers (§4.I) and pool claim indices.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub const fn new() -> Self {
        SequenceCounter(AtomicU64::new(0))
    }

    /// Returns the next value, starting at 0.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_counter_increments_from_zero() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.current(), 2);
    }
}
