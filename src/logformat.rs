// GENERATOR LOG FORMAT
// ONE RECORD PER WRITE: "<t_ms> <sleep_ms> <size>\n". bytegen WRITES THIS
// LOG WHILE EMITTING RANDOM TRAFFIC; bytereplay READS IT BACK TO REPRODUCE
// THE EXACT WRITE/SLEEP SCHEDULE DETERMINISTICALLY. PORTED FROM THE
// fscanf("%ld %d %ld\n", ...) / fprintf PAIR IN generator2.c / generator-clone.c.

use std::io::{BufRead, Write};

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub t_ms: u64,
    pub sleep_ms: u64,
    pub size: usize,
}

impl LogRecord {
    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "{} {} {}", self.t_ms, self.sleep_ms, self.size)
            .context("writing generator log record")
    }

    fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let t_ms = fields
            .next()
            .ok_or_else(|| anyhow!("missing t_ms field in log line: {line:?}"))?
            .parse()
            .with_context(|| format!("invalid t_ms in log line: {line:?}"))?;
        let sleep_ms = fields
            .next()
            .ok_or_else(|| anyhow!("missing sleep_ms field in log line: {line:?}"))?
            .parse()
            .with_context(|| format!("invalid sleep_ms in log line: {line:?}"))?;
        let size = fields
            .next()
            .ok_or_else(|| anyhow!("missing size field in log line: {line:?}"))?
            .parse()
            .with_context(|| format!("invalid size in log line: {line:?}"))?;
        Ok(Self {
            t_ms,
            sleep_ms,
            size,
        })
    }
}

/// Reads every record from a generator log, in file order. A blank trailing
/// line (common after `writeln!`-terminated files) is tolerated; any other
/// malformed line is an error, since a replay built on a corrupt schedule
/// would silently diverge from what was recorded.
pub fn read_all(reader: impl BufRead) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading generator log line")?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(LogRecord::parse(&line)?);
    }
    Ok(records)
}

/// Regenerates the wrapping 8-bit counter payload `generator2.c` writes:
/// byte `i` (0-indexed from the start of the whole stream, not the record)
/// is `(start_counter + i) % 256`. Returns the counter value to pass as
/// `start_counter` for the next record, so callers can thread it across
/// calls without re-deriving it from a running total.
pub fn fill_counter_payload(buf: &mut [u8], start_counter: u8) -> u8 {
    let mut counter = start_counter;
    for byte in buf.iter_mut() {
        *byte = counter;
        counter = counter.wrapping_add(1);
    }
    counter
}
