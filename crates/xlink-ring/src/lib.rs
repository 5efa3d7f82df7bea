//! The send-publication ring buffer (spec.md §4.I): a bounded multi-producer/
//! single-consumer claim/commit queue. A producer thread reserves the next
//! slot (`try_claim`), fills it with a flyweight-shaped write, then
//! publishes it (`commit`) or discards it (`abort`) without ever copying
//! the claimed bytes. The event loop's sender drains published slots in
//! claim order — per spec.md §9's design note, "commit order on the
//! producer side must equal dequeue order on the consumer", so the drain
//! side blocks at a still-pending slot rather than skipping ahead to a
//! slot published out of turn.

mod ring;

pub use ring::{Claim, Ring};
