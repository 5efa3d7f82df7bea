//! Metrics hooks attachable to sessions and event loops (spec.md §4.J).
//!
//! No external metrics crate is in the teacher's dependency set for this
//! layer (it leans on `tracing` for observability instead), so this
//! registry is plain atomics wrapped in a small struct — the counters are
//! just data; any exporter (Prometheus, the admin server) reads them by
//! reference. Prometheus export itself is out of scope per spec.md §1.

mod registry;

pub use registry::{Counter, Gauge, SessionMetrics};
