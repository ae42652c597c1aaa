//! The ring-buffer producer descriptor (spec §2.2/§3/§4.1): a fixed-capacity
//! circular queue of fixed-size elements, a parallel timestamp array, a
//! monotonically increasing produced-count, and a wake/wait pair shared by
//! every consumer.
//!
//! Single writer, many readers. A reader whose cursor falls more than
//! `capacity / 2` records behind `produced` has lost data; `Queue::is_stale`
//! tells it so.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thread_control::Flag;

/// How often a flag-aware wait re-checks its `Flag` while no data has
/// arrived. Bounds how long a stage can stay parked in `wait_or_flag` after
/// `Scheduler::shutdown` trips the DONE bit — must be comfortably under
/// `SHUTDOWN_GRACE`.
const FLAG_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Slot<T> {
    ts: f64,
    value: Option<T>,
}

struct Inner<T> {
    slots: Vec<Slot<T>>,
}

/// A single-writer/many-reader producer queue of fixed capacity.
pub struct Queue<T> {
    capacity: usize,
    update_interval: u64,
    produced: AtomicU64,
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize, update_interval: u64) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        assert!(update_interval >= 1, "update_interval must be >= 1");
        let slots = (0..capacity)
            .map(|_| Slot {
                ts: f64::NEG_INFINITY,
                value: None,
            })
            .collect();
        Queue {
            capacity,
            update_interval,
            produced: AtomicU64::new(0),
            inner: Mutex::new(Inner { slots }),
            available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of records ever emitted. Readers must use `Acquire` when they
    /// load this to observe a fully-written slot at `produced - 1`.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }

    /// Append one record at `timestamp`, wake waiters every `update_interval`
    /// pushes. Returns the logical index the record was written to.
    pub fn push(&self, timestamp: f64, value: T) -> u64 {
        let idx = self.produced.load(Ordering::Relaxed);
        {
            let mut inner = self.inner.lock();
            let slot = &mut inner.slots[(idx % self.capacity as u64) as usize];
            slot.ts = timestamp;
            slot.value = Some(value);
        }
        // The slot write above happens-before this store is observed by any
        // reader that does an Acquire load of `produced`.
        self.produced.store(idx + 1, Ordering::Release);
        if (idx + 1) % self.update_interval == 0 {
            self.signal_data_available();
        }
        idx
    }

    /// Fetch the record and timestamp at logical index `idx`, or `None` if
    /// it was never produced or has already been overwritten.
    pub fn get(&self, idx: u64) -> Option<(f64, T)> {
        let produced = self.produced();
        if idx >= produced {
            return None;
        }
        if produced - idx > self.capacity as u64 {
            return None;
        }
        let inner = self.inner.lock();
        let slot = &inner.slots[(idx % self.capacity as u64) as usize];
        slot.value.clone().map(|v| (slot.ts, v))
    }

    /// True if a cursor sitting at `consumed` has fallen far enough behind
    /// `produced` that slots it hasn't read may already be overwritten.
    pub fn is_stale(&self, consumed: u64) -> bool {
        self.produced().saturating_sub(consumed) > self.capacity as u64 / 2
    }

    /// Block until data becomes available (a push crossed an
    /// `update_interval` boundary) or `produced` has advanced past
    /// `since`, whichever comes first.
    ///
    /// Only safe to call from a context that does not need to respond to
    /// shutdown — prefer `wait_or_flag` from a `Stage::run` loop, since this
    /// version blocks forever if no further data ever arrives.
    pub fn wait(&self, since: u64) {
        if self.produced() > since {
            return;
        }
        let mut guard = self.inner.lock();
        while self.produced() <= since {
            // Condvar::wait requires a MutexGuard; reuse the record mutex
            // purely as the pairing lock, not to guard queue contents here.
            self.available.wait(&mut guard);
        }
    }

    /// Block until data becomes available past `since`, or `flag` goes
    /// false, whichever comes first. Polls `flag` every
    /// `FLAG_POLL_INTERVAL` rather than blocking indefinitely, so
    /// `Scheduler::shutdown`'s DONE bit unblocks a stage parked here well
    /// within its grace window even though nothing ever pushes again.
    pub fn wait_or_flag(&self, since: u64, flag: &Flag) {
        if self.produced() > since || !flag.is_alive() {
            return;
        }
        let mut guard = self.inner.lock();
        while self.produced() <= since && flag.is_alive() {
            self.available.wait_for(&mut guard, FLAG_POLL_INTERVAL);
        }
    }

    fn signal_data_available(&self) {
        let _guard = self.inner.lock();
        self.available.notify_all();
    }
}

/// A (consumer, producer) cursor: a `consumed` count that must never
/// decrease.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    consumed: u64,
}

impl Cursor {
    pub fn new() -> Self {
        Cursor { consumed: 0 }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// True if the paired queue has produced anything this cursor hasn't
    /// consumed yet.
    pub fn has_data<T: Clone>(&self, queue: &Queue<T>) -> bool {
        self.consumed < queue.produced()
    }

    /// Advance to `new_consumed`. Panics in debug builds if that would move
    /// the cursor backwards.
    pub fn advance_to(&mut self, new_consumed: u64) {
        debug_assert!(
            new_consumed >= self.consumed,
            "consumer cursor must never decrement"
        );
        self.consumed = new_consumed.max(self.consumed);
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn produced_is_monotonic_and_slots_readable() {
        let q: Queue<i32> = Queue::new(4, 1);
        for i in 0..4 {
            q.push(i as f64, i);
        }
        assert_eq!(q.produced(), 4);
        for i in 0..4u64 {
            let (ts, v) = q.get(i).unwrap();
            assert_eq!(v, i as i32);
            assert_eq!(ts, i as f64);
        }
    }

    #[test]
    fn overwritten_slots_are_not_returned() {
        let q: Queue<i32> = Queue::new(4, 1);
        for i in 0..10 {
            q.push(i as f64, i);
        }
        // slot 0 has been overwritten by slot 8 (index 0 mod 4)
        assert!(q.get(0).is_none());
        assert_eq!(q.get(9).unwrap().1, 9);
    }

    #[test]
    fn cursor_never_decrements() {
        let mut c = Cursor::new();
        c.advance_to(5);
        c.advance_to(10);
        assert_eq!(c.consumed(), 10);
    }

    #[test]
    fn is_stale_past_half_capacity() {
        let q: Queue<i32> = Queue::new(10, 1);
        for i in 0..10 {
            q.push(i as f64, i);
        }
        assert!(!q.is_stale(9));
        assert!(q.is_stale(0));
    }

    #[test]
    fn wait_or_flag_returns_promptly_once_flag_drops() {
        let q: Arc<Queue<i32>> = Arc::new(Queue::new(4, 1));
        let (flag, control) = thread_control::make_pair();
        let waiter_q = q.clone();
        let waiter = std::thread::spawn(move || {
            waiter_q.wait_or_flag(0, &flag);
        });
        // No data is ever pushed; only tripping the flag should unblock it.
        std::thread::sleep(Duration::from_millis(50));
        control.stop();
        waiter.join().expect("wait_or_flag did not return after flag dropped");
    }

    #[test]
    fn wait_or_flag_returns_immediately_when_data_already_present() {
        let q: Queue<i32> = Queue::new(4, 1);
        q.push(0.0, 1);
        let (flag, _control) = thread_control::make_pair();
        q.wait_or_flag(0, &flag); // must not block
    }
}
