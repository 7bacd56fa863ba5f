// ADAPTIVE TRAFFIC SMOOTHER
// READS STDIN, PRIMES A ~700ms RESERVOIR, THEN HANDS OFF TO A CONSUMER
// THREAD THAT PACES STDOUT AT A FEEDBACK-CONTROLLED RATE. THE PRODUCER
// (THIS THREAD) JUST PUSHES BYTES INTO THE SHARED QUEUE; bytepace::controller
// OWNS THE PACING.

use std::io::Read;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;

use bytepace::controller::SmootherContext;
use bytepace::log_info;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(about = "Smooths bursty stdin traffic into a steadier stdout rate")]
struct Args {
    /// Read buffer size in bytes.
    #[arg(short = 'b', long, default_value_t = 40 * 1024)]
    buffer_size: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    bytepace::shutdown::install(&SHUTDOWN)?;

    let mut ctx = SmootherContext::new(&SHUTDOWN, std::io::stdout);

    let stdin = std::io::stdin();
    let mut inf = stdin.lock();
    let mut buf = vec![0u8; args.buffer_size];
    let mut total_size: u64 = 0;

    while !bytepace::shutdown::requested(&SHUTDOWN) {
        let n = inf.read(&mut buf).context("reading stdin")?;
        if n == 0 {
            break; // EOF
        }
        total_size += n as u64;
        ctx.push(&buf[..n])?;
    }

    SHUTDOWN.store(true, std::sync::atomic::Ordering::Relaxed);
    ctx.finish()?;

    log_info!("Total {} bytes read", total_size);
    Ok(())
}
