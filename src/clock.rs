// MONOTONIC CLOCK HELPER
// DIFFERENCE OF TWO (SECONDS, MICROSECONDS) TIMESTAMPS IN WHOLE MILLISECONDS,
// BORROWING ACROSS THE SUB-SECOND BOUNDARY THE WAY get_time_interval_in_ms DID.

/// A `CLOCK_MONOTONIC` timestamp split into seconds and microseconds, the same
/// shape as the `struct timeval` the original tools diffed by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeVal {
    pub secs: u64,
    pub micros: u64,
}

impl TimeVal {
    pub const fn new(secs: u64, micros: u64) -> Self {
        Self { secs, micros }
    }
}

/// Reads `CLOCK_MONOTONIC`. Never fails in practice on Linux; a failed
/// `clock_gettime` call leaves `ts` zeroed, which just yields a zero reading.
pub fn now() -> TimeVal {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    TimeVal {
        secs: ts.tv_sec as u64,
        micros: (ts.tv_nsec as u64) / 1000,
    }
}

/// `t2 - t1` in whole milliseconds, borrowing 1s when `t2.micros < t1.micros`.
/// Assumes `t2 >= t1` (a monotonic clock guarantees this for any two readings
/// taken in order).
pub fn diff_ms(t1: TimeVal, t2: TimeVal) -> u64 {
    let mut diff = (t2.secs - t1.secs) * 1000;

    if t2.micros < t1.micros {
        diff -= 1000; // borrow 1 second to t2
        diff += (t2.micros + 1_000_000 - t1.micros) / 1000;
    } else {
        diff += (t2.micros - t1.micros) / 1000;
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_ms_same_instant() {
        let t = TimeVal::new(10, 500);
        assert_eq!(diff_ms(t, t), 0);
    }

    #[test]
    fn diff_ms_within_second() {
        let t1 = TimeVal::new(10, 100_000);
        let t2 = TimeVal::new(10, 600_000);
        assert_eq!(diff_ms(t1, t2), 500);
    }

    #[test]
    fn diff_ms_borrows_across_second() {
        let t1 = TimeVal::new(10, 900_000);
        let t2 = TimeVal::new(11, 100_000);
        // 200ms elapsed: 100_000us in the new second, minus the 900_000us
        // already spent in the old one.
        assert_eq!(diff_ms(t1, t2), 200);
    }

    #[test]
    fn diff_ms_multi_second_with_borrow() {
        let t1 = TimeVal::new(10, 800_000);
        let t2 = TimeVal::new(13, 200_000);
        // 3 whole seconds minus 600ms (800_000 -> 200_000 needs a borrow).
        assert_eq!(diff_ms(t1, t2), 2400);
    }

    #[test]
    fn diff_ms_exact_second_boundary() {
        let t1 = TimeVal::new(5, 0);
        let t2 = TimeVal::new(6, 0);
        assert_eq!(diff_ms(t1, t2), 1000);
    }
}
