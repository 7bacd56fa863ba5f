// PERIODIC SAMPLER + ANALYZER
// READS STDIN (NOT ECHOED TO STDOUT -- THIS TOOL ONLY OBSERVES), VERIFIES
// THE WRAPPING PAYLOAD COUNTER, BUCKETS BYTE COUNTS INTO `-g` MILLISECOND
// WINDOWS, LOGS EACH BUCKET TO `-s file`, AND REPORTS MEAN/STDDEV OVER THE
// RUN. GROUNDED ON bytelog2.c; `--no-verify` TOGETHER WITH `-g 200` REPRODUCES
// bytelog.c'S SIMPLER, UNVERIFIED FIXED-GRANULARITY VARIANT.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use bytepace::sampler::{Bucketizer, PayloadVerifier, Sample, SampleAnalyzer};
use bytepace::{clock, log_info, log_warn};

const IDLE_POLL_MS: u64 = 100;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(about = "Buckets stdin's byte rate into fixed windows and reports mean/stddev")]
struct Args {
    /// Report granularity in milliseconds.
    #[arg(short = 'g', long, default_value_t = 100)]
    granularity: u64,

    /// Maximum capture time in seconds (0 = forever).
    #[arg(short = 't', long, default_value_t = 0)]
    run_time: u64,

    /// Log file that receives one "<bucket_ms> <bytes>" line per window.
    #[arg(short = 's', long)]
    log: String,

    /// Read buffer size in bytes.
    #[arg(short = 'b', long, default_value_t = 4 * 1024)]
    buffer_size: usize,

    /// Skip the wrapping payload counter check (paired with `-g 200` to
    /// reproduce the simpler original sampler).
    #[arg(long)]
    no_verify: bool,
}

fn emit_sample(
    log: &mut impl Write,
    analyzer: &mut SampleAnalyzer,
    sample: Sample,
) -> Result<()> {
    writeln!(log, "{} {}", sample.time_ms, sample.bytes)?;
    log.flush()?;
    analyzer.add_sample(sample.bytes)?;
    Ok(())
}

fn spawn_reader(buffer_size: usize) -> mpsc::Receiver<std::io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::sync_channel(4);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut inf = stdin.lock();
        let mut buf = vec![0u8; buffer_size];
        loop {
            match inf.read(&mut buf) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.send(Ok(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
    rx
}

fn main() -> Result<()> {
    let args = Args::parse();
    bytepace::shutdown::install(&SHUTDOWN)?;

    let log_file = File::create(&args.log)
        .with_context(|| format!("cannot open '{}' for writing", args.log))?;
    let mut log = BufWriter::new(log_file);
    writeln!(log, "time-in-ms bytes")?;

    log_info!("Use buffer {} bytes", args.buffer_size);
    log_info!("Run for {} seconds", args.run_time);
    log_info!("Report granularity: {} milliseconds", args.granularity);

    let rx = spawn_reader(args.buffer_size);
    let mut verifier = PayloadVerifier::new();
    let mut bucketizer = Bucketizer::new(args.granularity, 0);
    let mut analyzer = SampleAnalyzer::new();
    let mut total_size: u64 = 0;

    let t_start = clock::now();

    loop {
        if bytepace::shutdown::requested(&SHUTDOWN) {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(IDLE_POLL_MS)) {
            Ok(Ok(buf)) => {
                if !args.no_verify {
                    if let Some(mismatch) = verifier.verify(&buf) {
                        bail!(
                            "byte {} error ({}/{})",
                            total_size + mismatch.offset,
                            mismatch.expected,
                            mismatch.found
                        );
                    }
                }

                let now_ms = clock::diff_ms(t_start, clock::now());
                total_size += buf.len() as u64;
                if let Some(sample) = bucketizer.observe(now_ms, buf.len() as u64) {
                    emit_sample(&mut log, &mut analyzer, sample)?;
                    while let Some(sample) = bucketizer.tick(now_ms) {
                        emit_sample(&mut log, &mut analyzer, sample)?;
                    }
                }

                if args.run_time != 0 && args.run_time * 1000 < now_ms {
                    break;
                }
            }
            Ok(Err(e)) => {
                log_warn!("read error: {e}");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let now_ms = clock::diff_ms(t_start, clock::now());
                while let Some(sample) = bucketizer.tick(now_ms) {
                    emit_sample(&mut log, &mut analyzer, sample)?;
                }
                if args.run_time != 0 && args.run_time * 1000 < now_ms {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break, // reader hit EOF
        }
    }

    let last = bucketizer.flush();
    if last.bytes > 0 {
        writeln!(log, "{} {}", last.time_ms, last.bytes)?;
        analyzer.add_sample(last.bytes)?;
    }
    log.flush()?;

    log_info!("Total {} bytes read", total_size);
    log_info!("Total report {} samples", analyzer.sample_count());
    log_info!(
        "Standard deviation(count={}, mean={:.0}): {:.0}",
        analyzer.sample_count(),
        analyzer.mean(),
        analyzer.stddev()
    );

    Ok(())
}
