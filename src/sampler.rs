// PERIODIC SAMPLER + ANALYZER
// ACCUMULATES "BYTES SEEN SINCE LAST BUCKET" ON A FIXED GRANULARITY, THEN
// REPORTS MEAN/STDDEV OVER THE RUN. analyze_sample_and_report IN bytelog2.c
// IS TWO-PASS (FIXED FINAL MEAN, THEN A SECOND PASS FOR THE SQUARED DIFFS);
// THIS PORT USES WELFORD'S ONLINE ALGORITHM SO SAMPLES NEVER NEED TO BE
// MATERIALIZED, WHICH CONVERGES TO THE SAME POPULATION VARIANCE.

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub time_ms: u64,
    pub bytes: u64,
}

/// Accumulates samples bucket-by-bucket and derives mean/stddev without
/// ever materializing the full sample list in memory.
#[derive(Debug, Default)]
pub struct SampleAnalyzer {
    sample_count: u64,
    mean: f64,
    // Raw running sum of (x - mean_before) * (x - mean_after), undivided,
    // per Welford's algorithm -- dividing by sample_count only at the end
    // (in variance()) is what makes this equal the two-pass fixed-mean
    // variance bytelog2.c computes, rather than an approximation of it.
    sum_sq_diff: f64,
}

impl SampleAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one bucket's byte count into the running mean/variance.
    /// `sum_sq_diff` is mathematically non-decreasing; a decrease can only
    /// come from floating point corruption, so it's reported as an error
    /// rather than panicking.
    pub fn add_sample(&mut self, bytes: u64) -> Result<()> {
        let old_sum_sq_diff = self.sum_sq_diff;
        self.sample_count += 1;
        let n = self.sample_count as f64;

        let delta = bytes as f64 - self.mean;
        self.mean += delta / n;
        let delta2 = bytes as f64 - self.mean;
        self.sum_sq_diff += delta * delta2;

        if self.sample_count > 1 && self.sum_sq_diff < old_sum_sq_diff {
            return Err(anyhow!(
                "variance accumulator went backwards ({} -> {}), refusing to report",
                old_sum_sq_diff,
                self.sum_sq_diff
            ));
        }
        Ok(())
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.sum_sq_diff / self.sample_count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// A `Granularity`-ms accumulation window: bytes arriving within the same
/// bucket are folded together before being handed to the analyzer, the way
/// bytelog2.c's 100ms-poll / `-g` granularity loop does.
pub struct Bucketizer {
    granularity_ms: u64,
    bucket_start_ms: u64,
    bucket_bytes: u64,
}

impl Bucketizer {
    pub fn new(granularity_ms: u64, start_ms: u64) -> Self {
        Self {
            granularity_ms: granularity_ms.max(1),
            bucket_start_ms: start_ms,
            bucket_bytes: 0,
        }
    }

    /// Accounts `n` bytes observed at `now_ms`. Returns a closed `Sample`
    /// every time `now_ms` has advanced past the current bucket's
    /// granularity; the caller should keep calling `close` in a loop until
    /// no more buckets remain, then keep feeding bytes into the new one.
    pub fn observe(&mut self, now_ms: u64, n: u64) -> Option<Sample> {
        self.bucket_bytes += n;
        self.maybe_close(now_ms)
    }

    /// Call on an idle tick carrying no new bytes, so a long gap in traffic
    /// still emits zero-filled buckets instead of silently merging it into
    /// the next one with data.
    pub fn tick(&mut self, now_ms: u64) -> Option<Sample> {
        self.maybe_close(now_ms)
    }

    fn maybe_close(&mut self, now_ms: u64) -> Option<Sample> {
        if now_ms < self.bucket_start_ms + self.granularity_ms {
            return None;
        }
        let sample = Sample {
            time_ms: self.bucket_start_ms,
            bytes: self.bucket_bytes,
        };
        self.bucket_start_ms += self.granularity_ms;
        self.bucket_bytes = 0;
        Some(sample)
    }

    /// Flushes whatever's accumulated in the still-open bucket, e.g. at
    /// run-time expiry or shutdown.
    pub fn flush(self) -> Sample {
        Sample {
            time_ms: self.bucket_start_ms,
            bytes: self.bucket_bytes,
        }
    }
}

/// Verifies the wrapping 8-bit payload counter bytelog2.c checks inline:
/// each byte should be exactly one more than the previous (mod 256). `prev`
/// is `None` before the first byte of the stream has been seen.
pub struct PayloadVerifier {
    prev: Option<u8>,
    offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadMismatch {
    pub offset: u64,
    pub expected: u8,
    pub found: u8,
}

impl PayloadVerifier {
    pub fn new() -> Self {
        Self {
            prev: None,
            offset: 0,
        }
    }

    /// Checks `buf` against the running counter, returning the first
    /// mismatch encountered, if any. Advances past the whole buffer
    /// regardless, so a caller that chooses to keep going after a mismatch
    /// (e.g. to report a count) can.
    pub fn verify(&mut self, buf: &[u8]) -> Option<PayloadMismatch> {
        let mut mismatch = None;
        for &byte in buf {
            if let Some(prev) = self.prev {
                let expected = prev.wrapping_add(1);
                if byte != expected && mismatch.is_none() {
                    mismatch = Some(PayloadMismatch {
                        offset: self.offset,
                        expected,
                        found: byte,
                    });
                }
            }
            self.prev = Some(byte);
            self.offset += 1;
        }
        mismatch
    }
}

impl Default for PayloadVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_constant_samples_is_that_constant() {
        let mut a = SampleAnalyzer::new();
        for _ in 0..10 {
            a.add_sample(500).unwrap();
        }
        assert_eq!(a.mean(), 500.0);
        assert_eq!(a.stddev(), 0.0);
    }

    #[test]
    fn variance_matches_the_fixed_mean_population_formula() {
        let mut a = SampleAnalyzer::new();
        for v in [100u64, 200, 300, 400, 500] {
            a.add_sample(v).unwrap();
        }
        assert_eq!(a.sample_count(), 5);
        assert_eq!(a.mean(), 300.0);
        // Sum((x - 300)^2) / 5 = (40000+10000+0+10000+40000)/5 = 20000.
        assert!((a.variance() - 20000.0).abs() < 1e-9);
        assert!((a.stddev() - 20000f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn bucketizer_emits_one_sample_per_granularity_window() {
        let mut b = Bucketizer::new(100, 0);
        assert!(b.observe(50, 10).is_none());
        let s = b.observe(100, 5).unwrap();
        assert_eq!(s, Sample { time_ms: 0, bytes: 15 });
        assert!(b.observe(150, 7).is_none());
        let s2 = b.observe(200, 0).unwrap();
        assert_eq!(s2, Sample { time_ms: 100, bytes: 7 });
    }

    #[test]
    fn bucketizer_tick_emits_zero_sample_on_idle_gap() {
        let mut b = Bucketizer::new(100, 0);
        let s = b.tick(100).unwrap();
        assert_eq!(s, Sample { time_ms: 0, bytes: 0 });
    }

    #[test]
    fn bucketizer_flush_returns_partial_bucket() {
        let mut b = Bucketizer::new(100, 0);
        b.observe(10, 42);
        let s = b.flush();
        assert_eq!(s, Sample { time_ms: 0, bytes: 42 });
    }

    #[test]
    fn payload_verifier_accepts_wrapping_sequence() {
        let mut v = PayloadVerifier::new();
        let buf: Vec<u8> = (0u8..=255).chain(0u8..=10).collect();
        assert!(v.verify(&buf).is_none());
    }

    #[test]
    fn payload_verifier_reports_first_mismatch_offset() {
        let mut v = PayloadVerifier::new();
        let buf = [0u8, 1, 2, 9, 4];
        let m = v.verify(&buf).unwrap();
        assert_eq!(m.offset, 3);
        assert_eq!(m.expected, 3);
        assert_eq!(m.found, 9);
    }

    #[test]
    fn payload_verifier_is_stateful_across_calls() {
        let mut v = PayloadVerifier::new();
        assert!(v.verify(&[0, 1, 2]).is_none());
        assert!(v.verify(&[3, 4, 5]).is_none());
        let m = v.verify(&[7]).unwrap();
        assert_eq!(m.expected, 6);
        assert_eq!(m.found, 7);
    }
}
