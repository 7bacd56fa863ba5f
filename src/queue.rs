// SEGMENTED BYTE QUEUE
// FIFO OF FIXED-SIZE SEGMENT BUFFERS. PRODUCER APPENDS AT THE NEWEST SEGMENT,
// CONSUMER DRAINS FROM THE OLDEST. TRACKS TOTAL BUFFERED BYTES.
//
// THE ORIGINAL DESIGN IS A DOUBLY LINKED LIST OF SEGMENTS WITH head/tail
// POINTERS; THE prev POINTER IS ONLY EVER USED TO UNLINK THE TAIL, SO A
// VecDeque<Segment> (push_back == "new head", pop_front == "unlink tail")
// CARRIES THE SAME FIFO AND ACCOUNTING INVARIANTS WITHOUT HAND-ROLLED LINKS.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

pub const SEGMENT_BYTES: usize = 40 * 1024;

struct Segment {
    data: Vec<u8>,
    start: usize,
}

impl Segment {
    fn with_capacity(cap: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve(cap)
            .map_err(|e| anyhow!("cannot allocate {} byte segment: {e}", cap))?;
        Ok(Self { data, start: 0 })
    }

    fn len(&self) -> usize {
        self.data.len() - self.start
    }

    fn remaining_capacity(&self) -> usize {
        SEGMENT_BYTES.saturating_sub(self.data.len())
    }
}

pub struct SegmentedQueue {
    inner: Mutex<VecDeque<Segment>>,
    buffer_level: AtomicUsize,
}

impl SegmentedQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            buffer_level: AtomicUsize::new(0),
        }
    }

    /// Best-effort gauge: MAY be read unlocked, per the design. Not a safety
    /// variable -- a reader can observe a value that's about to change.
    pub fn buffer_level(&self) -> usize {
        self.buffer_level.load(Ordering::Relaxed)
    }

    /// Appends `bytes` to the queue. Tops off whatever room remains in the
    /// newest segment first, then allocates new `SEGMENT_BYTES` segments for
    /// the rest. Allocation failure is fatal -- it would otherwise silently
    /// break FIFO ordering -- so it bubbles up as an error rather than
    /// panicking.
    pub fn push(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let mut guard = self.inner.lock().unwrap();
        let mut remaining = bytes;

        if let Some(seg) = guard.back_mut() {
            let room = seg.remaining_capacity();
            if room > 0 {
                let take = room.min(remaining.len());
                seg.data
                    .try_reserve(take)
                    .map_err(|e| anyhow!("cannot grow segment by {} bytes: {e}", take))?;
                seg.data.extend_from_slice(&remaining[..take]);
                remaining = &remaining[take..];
            }
        }

        while !remaining.is_empty() {
            let take = remaining.len().min(SEGMENT_BYTES);
            let mut seg = Segment::with_capacity(SEGMENT_BYTES)?;
            seg.data.extend_from_slice(&remaining[..take]);
            guard.push_back(seg);
            remaining = &remaining[take..];
        }

        self.buffer_level.fetch_add(bytes.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Writes up to `n` bytes from the oldest segment to `out`, releasing the
    /// lock before the write syscall so the producer is never blocked behind
    /// slow output. Issues at most one `write` per call; a consumer wanting
    /// to drain more than one segment's worth loops by calling again.
    /// Returns 0 (without touching `out`) if the queue is empty.
    pub fn drain(&self, n: usize, out: &mut impl Write) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }

        let bytes = {
            let mut guard = self.inner.lock().unwrap();
            let Some(seg) = guard.front_mut() else {
                return Ok(0);
            };

            let avail = seg.len();
            let take = avail.min(n);
            let bytes = seg.data[seg.start..seg.start + take].to_vec();

            seg.start += take;
            if seg.len() == 0 {
                guard.pop_front();
            }

            // buffer_level must reflect the new segment state by the time
            // the lock releases (spec's queue-accounting invariant), so
            // this runs before the block ends, not after the write below.
            self.buffer_level.fetch_sub(take, Ordering::Relaxed);
            bytes
        };

        out.write_all(&bytes)?;
        Ok(bytes.len())
    }

    #[cfg(test)]
    fn segment_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

impl Default for SegmentedQueue {
    fn default() -> Self {
        Self::new()
    }
}
