// OUTPUT PACER + FEEDBACK CONTROLLER
// CONSUMER THREAD WRITES `chunk` BYTES EVERY `tick` MS AND PERIODICALLY NUDGES
// THE TARGET RATE TO TRACK THE INPUT RATE WHILE BOUNDING THE QUEUE.
//
// THE THREE ADJUSTMENT RULES ARE A PURE FUNCTION (`evaluate`), TESTED
// INDEPENDENTLY OF THE THREAD LOOP THAT CALLS IT -- THE SAME SPLIT
// tuning.rs::detect_regime / adjust_batch_slice KEEP FROM adaptive.rs'S
// THREAD BODIES.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;

use crate::clock;
use crate::pacer::{self, CalibratedSleep};
use crate::priming::PrimingTracker;
use crate::queue::SegmentedQueue;
use crate::rate::InputRateEstimator;

/// Controller evaluates every >= 500ms of consumer wall time.
pub const CONTROLLER_EVAL_MS: u64 = 500;
/// No-spin backoff when the queue is observed empty mid-tick.
pub const EMPTY_BACKOFF_MS: u64 = 10;
/// Proportional gain; spec.md caps this at <= 0.1 to stay damped against the
/// 700ms priming reservoir. 1/20 = 0.05.
const GAIN_DIVISOR: i64 = 20;

/// State shared between the producer thread and the consumer thread. These
/// scalars are written by exactly one side and read by the other (except
/// `incoming_bps`, producer-written/consumer-read) -- torn reads would only
/// misjudge a single control step, so plain atomics suffice; no mutex is
/// needed for them. The queue has its own internal lock.
pub struct SharedPacing {
    pub queue: SegmentedQueue,
    pub target_rate_bps: AtomicU64,
    pub chunk_bytes: AtomicU64,
    pub write_interval_ms: AtomicU64,
    pub incoming_bps: AtomicU64,
}

impl SharedPacing {
    fn new() -> Self {
        Self {
            queue: SegmentedQueue::new(),
            target_rate_bps: AtomicU64::new(0),
            chunk_bytes: AtomicU64::new(0),
            write_interval_ms: AtomicU64::new(0),
            incoming_bps: AtomicU64::new(0),
        }
    }
}

/// Inputs to one controller evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ControllerInputs {
    pub avg_out_bps: u64,
    pub incoming_bps: u64,
    pub buffer_level: u64,
    pub target_rate_bps: u64,
}

/// Steers `target_rate_bps` toward `incoming_bps`, then (asymmetrically)
/// speeds up further if the buffer has grown past half the incoming rate.
/// The controller never deliberately slows down to grow the buffer, only
/// speeds up to shrink it -- this bounds `buffer_level` without needing a
/// separate "too low" rule. Returns the new `target_rate_bps`, clamped >= 0
/// (0 = halt).
///
/// `incoming_bps == 0` means "unknown" (no window has closed yet); the
/// controller leaves the target untouched in that case.
pub fn evaluate(inputs: ControllerInputs) -> u64 {
    if inputs.incoming_bps == 0 {
        return inputs.target_rate_bps;
    }

    let mut target = inputs.target_rate_bps as i64;

    if inputs.avg_out_bps != inputs.incoming_bps {
        let delta = inputs.incoming_bps as i64 - inputs.avg_out_bps as i64;
        target += delta / GAIN_DIVISOR;
    }

    let half_incoming = inputs.incoming_bps / 2;
    if inputs.buffer_level >= half_incoming {
        let delta = inputs.buffer_level as i64 - half_incoming as i64;
        target += delta / GAIN_DIVISOR;
    }

    target.max(0) as u64
}

fn recompute_chunk_bytes(target_rate_bps: u64, write_interval_ms: u64) -> u64 {
    target_rate_bps * write_interval_ms / 1000
}

/// Runs the consumer loop until shutdown is requested and the queue has
/// drained, or a write fails. Write errors are fatal, matching spec.md's
/// error taxonomy for the consumer.
fn consumer_loop<W: Write>(
    shared: &SharedPacing,
    mut out: W,
    cal: CalibratedSleep,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let mut t1 = clock::now();
    let mut out_bytes: u64 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) && shared.queue.buffer_level() == 0 {
            return Ok(());
        }

        let chunk = shared.chunk_bytes.load(Ordering::Relaxed);
        let write_interval_ms = shared.write_interval_ms.load(Ordering::Relaxed);
        cal.sleep_ms(write_interval_ms);

        // Bounded by this tick's own interval: a sustained slow input (not
        // just EOF) must not stall the periodic re-evaluation below by
        // backing off indefinitely waiting for a full chunk.
        let tick_start = clock::now();
        let mut remaining = chunk;
        while remaining > 0 {
            let written = shared.queue.drain(remaining as usize, &mut out)? as u64;
            if written == 0 {
                if shutdown.load(Ordering::Relaxed) && shared.queue.buffer_level() == 0 {
                    break;
                }
                if clock::diff_ms(tick_start, clock::now()) >= write_interval_ms.max(EMPTY_BACKOFF_MS) {
                    break;
                }
                pacer::sleep_us(EMPTY_BACKOFF_MS * 1000);
                continue;
            }
            out_bytes += written;
            remaining -= remaining.min(written);
        }

        let now = clock::now();
        let elapsed_ms = clock::diff_ms(t1, now);
        if elapsed_ms >= CONTROLLER_EVAL_MS {
            let avg_out_bps = out_bytes * 1000 / elapsed_ms.max(1);
            let new_target = evaluate(ControllerInputs {
                avg_out_bps,
                incoming_bps: shared.incoming_bps.load(Ordering::Relaxed),
                buffer_level: shared.queue.buffer_level() as u64,
                target_rate_bps: shared.target_rate_bps.load(Ordering::Relaxed),
            });
            shared.target_rate_bps.store(new_target, Ordering::Relaxed);
            shared.chunk_bytes.store(
                recompute_chunk_bytes(new_target, write_interval_ms),
                Ordering::Relaxed,
            );
            t1 = now;
            out_bytes = 0;
        }
    }
}

/// Owns the queue, the priming/rate-estimate state (producer-only, not
/// shared), the pacing parameters, and the consumer thread. One context per
/// stream, as spec.md's data model requires.
pub struct SmootherContext<W: Write + Send + 'static> {
    shared: Arc<SharedPacing>,
    cal: CalibratedSleep,
    priming: PrimingTracker,
    rate: InputRateEstimator,
    consumer: Option<JoinHandle<Result<()>>>,
    shutdown: &'static AtomicBool,
    make_writer: Box<dyn Fn() -> W + Send>,
}

impl<W: Write + Send + 'static> SmootherContext<W> {
    pub fn new(shutdown: &'static AtomicBool, make_writer: impl Fn() -> W + Send + 'static) -> Self {
        let now = clock::now();
        Self {
            shared: Arc::new(SharedPacing::new()),
            cal: CalibratedSleep::calibrate(),
            priming: PrimingTracker::new(),
            rate: InputRateEstimator::new(now),
            consumer: None,
            shutdown,
            make_writer: Box::new(make_writer),
        }
    }

    pub fn buffer_level(&self) -> usize {
        self.shared.queue.buffer_level()
    }

    pub fn consumer_running(&self) -> bool {
        self.consumer.is_some()
    }

    /// Producer-side operation: push bytes, advance the rate estimator and
    /// priming state machine, and spawn the consumer thread the instant
    /// priming completes.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        let now = clock::now();

        self.shared.queue.push(bytes)?;
        self.rate.on_push(now, bytes.len() as u64);
        self.shared
            .incoming_bps
            .store(self.rate.incoming_bps(), Ordering::Relaxed);

        let buffer_level = self.shared.queue.buffer_level() as u64;
        if let Some(result) = self.priming.on_push(now, buffer_level) {
            let write_interval_ms = self.cal.initial_interval_ms;
            self.shared
                .target_rate_bps
                .store(result.target_rate_bps, Ordering::Relaxed);
            // Seed the rate estimate with what priming just measured --
            // the 1s window estimator won't close its first window for a
            // while yet, and would otherwise read as "unknown" in the
            // meantime.
            self.shared
                .incoming_bps
                .store(result.target_rate_bps, Ordering::Relaxed);
            self.shared
                .write_interval_ms
                .store(write_interval_ms, Ordering::Relaxed);
            self.shared.chunk_bytes.store(
                recompute_chunk_bytes(result.target_rate_bps, write_interval_ms),
                Ordering::Relaxed,
            );
            self.spawn_consumer();
        }

        Ok(())
    }

    fn spawn_consumer(&mut self) {
        let shared = Arc::clone(&self.shared);
        let cal = self.cal;
        let shutdown = self.shutdown;
        let out = (self.make_writer)();
        self.consumer = Some(std::thread::spawn(move || {
            consumer_loop(&shared, out, cal, shutdown)
        }));
    }

    /// Call once the producer has seen EOF (after setting `shutdown`).
    /// If priming completed, blocks until the consumer thread drains the
    /// queue and exits. If priming never completed -- the degenerate
    /// "trivial pass-through" path, a stream shorter than the priming
    /// window -- the consumer was never spawned, so whatever is still
    /// queued is flushed directly here instead of being lost.
    pub fn finish(mut self) -> Result<()> {
        if let Some(handle) = self.consumer.take() {
            return handle.join().expect("consumer thread panicked");
        }

        let mut out = (self.make_writer)();
        loop {
            let written = self.shared.queue.drain(64 * 1024, &mut out)?;
            if written == 0 {
                break;
            }
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(avg_out: u64, incoming: u64, buffer: u64, target: u64) -> ControllerInputs {
        ControllerInputs {
            avg_out_bps: avg_out,
            incoming_bps: incoming,
            buffer_level: buffer,
            target_rate_bps: target,
        }
    }

    #[test]
    fn unknown_incoming_rate_leaves_target_untouched() {
        let out = evaluate(inputs(5000, 0, 1000, 10_000));
        assert_eq!(out, 10_000);
    }

    #[test]
    fn speeds_up_when_behind_incoming_rate() {
        // avg_out < incoming: should increase target.
        let out = evaluate(inputs(8_000, 10_000, 0, 10_000));
        assert!(out > 10_000);
    }

    #[test]
    fn slows_down_when_ahead_of_incoming_rate() {
        // avg_out > incoming, buffer below half-incoming so the drain rule
        // doesn't fire: target should decrease.
        let out = evaluate(inputs(12_000, 10_000, 1000, 10_000));
        assert!(out < 10_000);
    }

    #[test]
    fn never_goes_negative() {
        let out = evaluate(inputs(1_000_000, 10_000, 0, 10_000));
        assert_eq!(out, 0);
    }

    #[test]
    fn high_buffer_speeds_up_even_when_on_rate() {
        // avg_out == incoming (no rate-tracking term) but buffer_level far
        // above incoming_bps/2: the drain-reservoir rule should still push
        // target up.
        let out = evaluate(inputs(10_000, 10_000, 50_000, 10_000));
        assert!(out > 10_000);
    }

    #[test]
    fn low_buffer_never_slows_down_to_grow_it() {
        // buffer_level well below incoming_bps/2 and avg_out == incoming:
        // nothing should change -- the controller never deliberately slows
        // down to grow the reservoir.
        let out = evaluate(inputs(10_000, 10_000, 100, 10_000));
        assert_eq!(out, 10_000);
    }

    #[test]
    fn chunk_bytes_recomputation_matches_invariant() {
        assert_eq!(recompute_chunk_bytes(10_000, 50), 500);
        assert_eq!(recompute_chunk_bytes(0, 50), 0);
    }
}
