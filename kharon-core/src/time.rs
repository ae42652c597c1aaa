use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-ish wall clock with an adjustable offset, applied by external
/// clock sync (UDP time-sync broadcast is out of scope; this is the cell
/// its receiver would write into).
///
/// `now()` returns seconds since epoch as `f64`, matching the timestamp
/// representation used throughout the producer queues.
pub struct TimeBase {
    offset_usec: AtomicI64,
}

impl TimeBase {
    pub fn new() -> Self {
        TimeBase {
            offset_usec: AtomicI64::new(0),
        }
    }

    /// Seconds since epoch, including the current offset.
    pub fn now(&self) -> f64 {
        self.now_usec() as f64 / 1_000_000.0
    }

    pub fn now_usec(&self) -> i64 {
        let local = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_micros() as i64;
        local + self.offset_usec.load(Ordering::Acquire)
    }

    /// Apply a new offset from an external clock-sync source. Readers
    /// tolerate a stale offset between the write and their next load.
    pub fn set_offset_usec(&self, offset_usec: i64) {
        self.offset_usec.store(offset_usec, Ordering::Release);
    }

    pub fn offset_usec(&self) -> i64 {
        self.offset_usec.load(Ordering::Acquire)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest multiple of `interval_usec` that is `<= t_usec`.
pub fn round_down_usec(t_usec: i64, interval_usec: i64) -> i64 {
    t_usec.div_euclid(interval_usec) * interval_usec
}

/// Smallest multiple of `interval_usec` that is `>= t_usec`.
pub fn round_up_usec(t_usec: i64, interval_usec: i64) -> i64 {
    let down = round_down_usec(t_usec, interval_usec);
    if down == t_usec {
        down
    } else {
        down + interval_usec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_down_to_grid() {
        assert_eq!(round_down_usec(10_003_000, 10_000), 10_000_000);
        assert_eq!(round_down_usec(10_000_000, 10_000), 10_000_000);
    }

    #[test]
    fn rounds_up_to_grid() {
        assert_eq!(round_up_usec(10_003_000, 10_000), 10_010_000);
        assert_eq!(round_up_usec(10_000_000, 10_000), 10_000_000);
    }

    #[test]
    fn offset_applies_immediately() {
        let tb = TimeBase::new();
        let before = tb.now_usec();
        tb.set_offset_usec(5_000_000);
        let after = tb.now_usec();
        assert!(after - before >= 4_999_000);
    }
}
