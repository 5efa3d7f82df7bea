//! Per-thread message pool: one preallocated byte buffer per concrete
//! message type, reused across calls. A flyweight is wrapped over the
//! returned buffer for the duration of one handler call; the pool never
//! hands out the same buffer twice concurrently because it is thread-local
//! and `with_buffer` holds the only borrow for the closure's lifetime.

use std::cell::RefCell;
use std::collections::HashMap;

/// Identifies a concrete message type within a thread's pool: the
/// protocol plus its template id / type code, widened to `u32` so one map
/// key works across all three protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey(pub u32);

impl PoolKey {
    pub fn fix(msg_type: &str) -> Self {
        let mut code = 0u32;
        for b in msg_type.bytes() {
            code = (code << 8) | b as u32;
        }
        PoolKey(0x0100_0000 | code)
    }

    pub fn ouch(type_code: u8) -> Self {
        PoolKey(0x0200_0000 | type_code as u32)
    }

    pub fn sbe(template_id: u16) -> Self {
        PoolKey(0x0300_0000 | template_id as u32)
    }
}

#[derive(Default)]
struct PoolState {
    buffers: HashMap<PoolKey, Vec<u8>>,
}

thread_local! {
    static POOL: RefCell<PoolState> = RefCell::new(PoolState::default());
}

/// Returns this thread's reusable buffer for `key`, growing it to at
/// least `min_len` bytes and zeroing it (equivalent to the flyweight's
/// `reset()`) before invoking `f`. The buffer never outlives `f`.
pub fn with_buffer<F, R>(key: PoolKey, min_len: usize, f: F) -> R
where
    F: FnOnce(&mut [u8]) -> R,
{
    POOL.with(|pool| {
        let mut state = pool.borrow_mut();
        let buf = state.buffers.entry(key).or_default();
        if buf.len() < min_len {
            buf.resize(min_len, 0);
        }
        buf[..min_len].fill(0);
        f(&mut buf[..min_len])
    })
}

/// Drops this thread's pooled buffer for `key`, if any — used in tests
/// that need to assert on fresh allocation behavior.
pub fn clear(key: PoolKey) {
    POOL.with(|pool| {
        pool.borrow_mut().buffers.remove(&key);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_reused_across_calls() {
        let key = PoolKey::ouch(b'O');
        clear(key);
        let first_ptr = with_buffer(key, 16, |buf| {
            buf[0] = 9;
            buf.as_ptr() as usize
        });
        let second_ptr = with_buffer(key, 16, |buf| {
            assert_eq!(buf[0], 0, "buffer must be reset before reuse");
            buf.as_ptr() as usize
        });
        assert_eq!(first_ptr, second_ptr);
    }

    #[test]
    fn buffer_grows_to_fit_larger_requests() {
        let key = PoolKey::fix("A");
        clear(key);
        with_buffer(key, 8, |buf| assert_eq!(buf.len(), 8));
        with_buffer(key, 64, |buf| assert_eq!(buf.len(), 64));
    }
}
