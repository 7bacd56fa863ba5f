// CALIBRATED SLEEP
// BEST-EFFORT sleep(us) WITH slept >= us. AT STARTUP, MEASURE THE OVERSHOOT OF
// ONE SUCH REQUEST AND KEEP IT AS initial_interval_ms -- THE SAME BRACKET
// cli/probe.rs TAKES INTERACTIVELY, TAKEN ONCE HERE TO SEED THE PACER.
//
// ON A TIME-SHARED OS THE REALIZED SLEEP IS TYPICALLY LONGER THAN REQUESTED;
// CALIBRATING ONCE AVOIDS OVERESTIMATING AVAILABLE THROUGHPUT.

use crate::clock;

#[derive(Debug, Clone, Copy)]
pub struct CalibratedSleep {
    /// Effective minimum tick, in milliseconds, derived from the calibration
    /// sleep's measured overshoot.
    pub initial_interval_ms: u64,
}

impl CalibratedSleep {
    /// Requests a 10ms sleep, measures the elapsed wall time, and stores it
    /// as the effective tick.
    pub fn calibrate() -> Self {
        const PROBE_MS: u64 = 10;
        let t1 = clock::now();
        sleep_us(PROBE_MS * 1000);
        let t2 = clock::now();
        let measured = clock::diff_ms(t1, t2).max(PROBE_MS);
        Self {
            initial_interval_ms: measured,
        }
    }

    /// Sleeps for at least `ms` milliseconds.
    pub fn sleep_ms(&self, ms: u64) {
        sleep_us(ms * 1000);
    }
}

/// Best-effort `slept >= us`, via `nanosleep` retried on `EINTR`.
pub fn sleep_us(us: u64) {
    let mut req = libc::timespec {
        tv_sec: (us / 1_000_000) as libc::time_t,
        tv_nsec: ((us % 1_000_000) * 1000) as libc::c_long,
    };
    loop {
        let mut rem = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::nanosleep(&req, &mut rem) };
        if rc == 0 {
            break;
        }
        // INTERRUPTED: SLEEP THE REMAINDER
        req = rem;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibrate_reports_at_least_the_probe_interval() {
        let cal = CalibratedSleep::calibrate();
        assert!(cal.initial_interval_ms >= 10);
        // A HEALTHY TEST HOST SHOULDN'T OVERSHOOT BY SECONDS.
        assert!(cal.initial_interval_ms < 2000);
    }

    #[test]
    fn sleep_ms_actually_elapses_at_least_that_long() {
        let t1 = clock::now();
        sleep_us(20_000);
        let t2 = clock::now();
        assert!(clock::diff_ms(t1, t2) >= 20);
    }
}
