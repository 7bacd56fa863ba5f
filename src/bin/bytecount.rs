// LIVE-RATE METER
// COPIES STDIN TO STDOUT UNCHANGED, REPORTING THE AVERAGE BYTE RATE OVER
// EVERY ~2 SECOND WINDOW TO STDERR. AN OPTIONAL WARNING BAND STOPS THE
// STREAM (NOT JUST A WARNING) WHEN THE RATE DRIFTS OUTSIDE IT. GROUNDED ON
// bytecount.c.

use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;

use bytepace::{clock, log_info, log_warn};

const REPORT_WINDOW_MS: u64 = 2000;
/// The first few reports reflect startup transients (pipe fill, OS
/// scheduling jitter) rather than steady-state rate; the warning band
/// only applies once that warm-up has passed.
const WARMUP_REPORTS: u64 = 3;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(about = "Copies stdin to stdout, reporting the live byte rate")]
struct Args {
    /// Read buffer size in bytes.
    #[arg(short = 'b', long, default_value_t = 40 * 1024)]
    buffer_size: usize,

    /// Report the rate in Mbit/s instead of bytes/sec.
    #[arg(short = 'm', long)]
    mbit: bool,

    /// "low:high" warning band; stream stops once the rate leaves it.
    #[arg(short = 'w', long, value_parser = parse_warn_band)]
    warn: Option<(u64, u64)>,
}

fn parse_warn_band(s: &str) -> Result<(u64, u64), String> {
    let (low, high) = s
        .split_once(':')
        .ok_or_else(|| format!("expected \"low:high\", got {s:?}"))?;
    let low: u64 = low.parse().map_err(|_| format!("invalid low mark in {s:?}"))?;
    let high: u64 = high.parse().map_err(|_| format!("invalid high mark in {s:?}"))?;
    Ok((low, high))
}

fn main() -> Result<()> {
    let args = Args::parse();
    bytepace::shutdown::install(&SHUTDOWN)?;

    log_info!("using buffer of {} bytes", args.buffer_size);
    if let Some((low, high)) = args.warn {
        log_info!("warning band is {}~{}", low, high);
    }

    let stdin = std::io::stdin();
    let mut inf = stdin.lock();
    let stdout = std::io::stdout();
    let mut outf = stdout.lock();

    let mut buf = vec![0u8; args.buffer_size];
    let mut total_size: u64 = 0;
    let mut window_bytes: u64 = 0;
    let mut t1 = clock::now();
    let mut report_count: u64 = 0;

    while !bytepace::shutdown::requested(&SHUTDOWN) {
        let n = inf.read(&mut buf).context("reading stdin")?;
        if n == 0 {
            break; // EOF
        }

        total_size += n as u64;
        window_bytes += n as u64;

        let t2 = clock::now();
        if t2.secs >= t1.secs + REPORT_WINDOW_MS / 1000 {
            let elapsed_ms = clock::diff_ms(t1, t2);
            if elapsed_ms == 0 {
                log_warn!("internal exception: zero-width report window");
            } else {
                let average_bytes = window_bytes * 1000 / elapsed_ms;
                report_count += 1;
                let past_warmup = report_count > WARMUP_REPORTS;

                let out_of_range = if args.mbit {
                    let mbits = (average_bytes as f64 * 8.0) / 1024.0 / 1024.0;
                    log_info!("Avg. {:.2} Mbits/sec", mbits);
                    past_warmup
                        && args
                            .warn
                            .map(|(low, high)| mbits < low as f64 || mbits > high as f64)
                            .unwrap_or(false)
                } else {
                    log_info!("Avg. {} bytes/sec", average_bytes);
                    past_warmup
                        && args
                            .warn
                            .map(|(low, high)| average_bytes < low || average_bytes > high)
                            .unwrap_or(false)
                };

                if out_of_range {
                    log_warn!("rate out of range, stopping");
                    break;
                }

                window_bytes = 0;
                t1 = t2;
            }
        }

        outf.write_all(&buf[..n]).context("writing stdout")?;
    }

    log_info!("Total {} bytes read", total_size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_warn_band() {
        assert_eq!(parse_warn_band("10:20").unwrap(), (10, 20));
    }

    #[test]
    fn rejects_a_band_without_a_colon() {
        assert!(parse_warn_band("10-20").is_err());
    }

    #[test]
    fn rejects_non_numeric_marks() {
        assert!(parse_warn_band("a:20").is_err());
        assert!(parse_warn_band("10:b").is_err());
    }
}
