//! Plain atomic counters and gauges, one [`SessionMetrics`] bound per
//! session. Field names match spec.md §4.J's required set exactly.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Counter(AtomicU64::new(0))
    }

    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub const fn new() -> Self {
        Gauge(AtomicI64::new(0))
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters and gauges for one session, per spec.md §4.J:
/// `messages_sent, messages_received, heartbeats_sent,
/// heartbeats_received, rejects, disconnects` counters, and
/// `current state (as a code), seq numbers, queue depth` gauges.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub messages_sent: Counter,
    pub messages_received: Counter,
    pub heartbeats_sent: Counter,
    pub heartbeats_received: Counter,
    pub rejects: Counter,
    pub disconnects: Counter,

    pub state: Gauge,
    pub outbound_seq: Gauge,
    pub inbound_expected_seq: Gauge,
    pub queue_depth: Gauge,
}

impl SessionMetrics {
    pub fn new() -> Self {
        SessionMetrics::default()
    }
}
