//! A bounded MPSC claim/commit ring over reused byte buffers.
//!
//! Each slot carries its own publication state so the consumer can tell
//! "not yet written", "committed, ready to drain" and "aborted, skip"
//! apart; cursors are cache-line padded (`repr(align(64))`) so producer
//! claims on one core don't bounce the consumer's cache line and vice
//! versa, per spec.md §9's design note.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const FREE: u32 = 0;
const PENDING: u32 = 1;
const COMMITTED: u32 = 2;
const ABORTED: u32 = 3;

#[repr(align(64))]
struct PaddedCursor(AtomicU64);

struct Slot {
    buffer: UnsafeCell<Vec<u8>>,
    len: UnsafeCell<usize>,
    msg_type: UnsafeCell<u32>,
    state: AtomicU32,
}

// SAFETY: `state` is the single point of synchronization. A producer only
// touches a slot's `buffer`/`len`/`msg_type` between winning the CAS in
// `try_claim` and its own `commit`/`abort`, and the consumer only touches
// them after observing `state == COMMITTED` via an `Acquire` load — the
// `Release` store that sets `COMMITTED` happens-before that load.
unsafe impl Sync for Slot {}

/// A bounded claim/commit ring of `capacity` (must be a power of two)
/// reusable slots.
pub struct Ring {
    capacity: usize,
    mask: usize,
    slots: Box<[Slot]>,
    claim_cursor: PaddedCursor,
    consumer_cursor: PaddedCursor,
}

impl Ring {
    pub fn new(capacity: usize, slot_capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let slots = (0..capacity)
            .map(|_| Slot {
                buffer: UnsafeCell::new(vec![0u8; slot_capacity]),
                len: UnsafeCell::new(0),
                msg_type: UnsafeCell::new(0),
                state: AtomicU32::new(FREE),
            })
            .collect();
        Ring {
            capacity,
            mask: capacity - 1,
            slots,
            claim_cursor: PaddedCursor(AtomicU64::new(0)),
            consumer_cursor: PaddedCursor(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently claimed-but-undrained — the backpressure signal
    /// callers can expose as the `queue_depth` gauge (spec.md §4.J).
    pub fn depth(&self) -> u64 {
        self.claim_cursor.0.load(Ordering::Relaxed) - self.consumer_cursor.0.load(Ordering::Relaxed)
    }

    /// Reserves the next slot for `msg_type`, sized to at least `len`
    /// bytes, or returns `None` if the ring is full (backpressure) — the
    /// caller must retry or drop, per spec.md §4.I.
    pub fn try_claim(&self, msg_type: u32, len: usize) -> Option<Claim<'_>> {
        loop {
            let claim_idx = self.claim_cursor.0.load(Ordering::Relaxed);
            let consumed = self.consumer_cursor.0.load(Ordering::Acquire);
            if claim_idx - consumed >= self.capacity as u64 {
                return None;
            }
            if self
                .claim_cursor
                .0
                .compare_exchange_weak(claim_idx, claim_idx + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let slot_idx = (claim_idx as usize) & self.mask;
                let slot = &self.slots[slot_idx];
                unsafe {
                    let buf = &mut *slot.buffer.get();
                    if buf.len() < len {
                        buf.resize(len, 0);
                    }
                    buf[..len].fill(0);
                    *slot.len.get() = len;
                    *slot.msg_type.get() = msg_type;
                }
                slot.state.store(PENDING, Ordering::Relaxed);
                return Some(Claim {
                    ring: self,
                    claim_index: claim_idx,
                    slot_idx,
                    len,
                });
            }
        }
    }

    /// Drains every committed slot in claim order, invoking `f(msg_type,
    /// claim_index, bytes)` for each, stopping at the first still-pending
    /// slot. Returns the number of slots drained.
    pub fn drain<F>(&self, mut f: F) -> usize
    where
        F: FnMut(u32, u64, &[u8]),
    {
        let mut n = 0;
        loop {
            let idx = self.consumer_cursor.0.load(Ordering::Relaxed);
            let slot_idx = (idx as usize) & self.mask;
            let slot = &self.slots[slot_idx];
            match slot.state.load(Ordering::Acquire) {
                PENDING | FREE => break,
                ABORTED => {
                    slot.state.store(FREE, Ordering::Relaxed);
                    self.consumer_cursor.0.fetch_add(1, Ordering::Release);
                }
                COMMITTED => {
                    unsafe {
                        let len = *slot.len.get();
                        let buf = &*slot.buffer.get();
                        let msg_type = *slot.msg_type.get();
                        f(msg_type, idx, &buf[..len]);
                    }
                    slot.state.store(FREE, Ordering::Relaxed);
                    self.consumer_cursor.0.fetch_add(1, Ordering::Release);
                    n += 1;
                }
                other => unreachable!("slot state {other} is not a valid publication state"),
            }
        }
        n
    }
}

/// A claimed, not-yet-published slot. `commit` publishes it; dropping
/// without committing (or calling `abort` explicitly) yields the slot back
/// without publication.
pub struct Claim<'a> {
    ring: &'a Ring,
    claim_index: u64,
    slot_idx: usize,
    len: usize,
}

impl<'a> Claim<'a> {
    pub fn claim_index(&self) -> u64 {
        self.claim_index
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: this producer holds the only `Claim` for `slot_idx`
        // until it commits or aborts (see the `Sync` justification above).
        unsafe {
            let buf: &mut Vec<u8> = &mut *self.ring.slots[self.slot_idx].buffer.get();
            &mut buf[..self.len]
        }
    }

    pub fn commit(self) {
        self.ring.slots[self.slot_idx].state.store(COMMITTED, Ordering::Release);
        std::mem::forget(self);
    }

    pub fn abort(self) {
        self.ring.slots[self.slot_idx].state.store(ABORTED, Ordering::Release);
        std::mem::forget(self);
    }
}

impl Drop for Claim<'_> {
    /// An uncommitted claim that is simply dropped aborts, matching
    /// `abort`'s semantics — the slot is yielded without publication.
    fn drop(&mut self) {
        self.ring.slots[self.slot_idx].state.store(ABORTED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_drain_delivers_in_claim_order() {
        let ring = Ring::new(4, 16);
        for i in 0..3u8 {
            let mut claim = ring.try_claim(7, 4).unwrap();
            claim.as_mut_slice().copy_from_slice(&[i, i, i, i]);
            claim.commit();
        }
        let mut seen = Vec::new();
        ring.drain(|msg_type, claim_index, bytes| {
            seen.push((msg_type, claim_index, bytes[0]));
        });
        assert_eq!(seen, vec![(7, 0, 0), (7, 1, 1), (7, 2, 2)]);
    }

    #[test]
    fn aborted_claim_is_skipped_without_blocking_later_commits() {
        let ring = Ring::new(4, 16);
        let claim = ring.try_claim(1, 4).unwrap();
        claim.abort();
        let mut claim2 = ring.try_claim(2, 4).unwrap();
        claim2.as_mut_slice().copy_from_slice(&[9, 9, 9, 9]);
        claim2.commit();

        let mut seen = Vec::new();
        ring.drain(|msg_type, _idx, _bytes| seen.push(msg_type));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn drain_stops_at_a_still_pending_slot() {
        let ring = Ring::new(4, 16);
        let first = ring.try_claim(1, 4).unwrap();
        let mut second = ring.try_claim(2, 4).unwrap();
        second.as_mut_slice().copy_from_slice(&[1, 1, 1, 1]);
        second.commit();
        // `first` stays uncommitted — drain must not skip ahead to `second`.

        let mut seen = Vec::new();
        ring.drain(|msg_type, _idx, _bytes| seen.push(msg_type));
        assert!(seen.is_empty());
        drop(first);
    }

    #[test]
    fn claim_returns_none_when_ring_is_full() {
        let ring = Ring::new(2, 8);
        let _a = ring.try_claim(1, 4).unwrap();
        let _b = ring.try_claim(2, 4).unwrap();
        assert!(ring.try_claim(3, 4).is_none());
    }

    #[test]
    fn concurrent_producers_each_get_a_distinct_slot() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(Ring::new(64, 8));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let ring = ring.clone();
                thread::spawn(move || {
                    let mut claim = ring.try_claim(i as u32, 1).unwrap();
                    claim.as_mut_slice()[0] = i;
                    claim.commit();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = Vec::new();
        ring.drain(|msg_type, _idx, bytes| seen.push((msg_type, bytes[0])));
        seen.sort();
        assert_eq!(seen, (0..8u8).map(|i| (i as u32, i)).collect::<Vec<_>>());
    }
}
