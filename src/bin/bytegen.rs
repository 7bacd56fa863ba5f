// TRAFFIC GENERATOR
// WRITES RANDOM-SIZED CHUNKS OF A WRAPPING COUNTER PAYLOAD TO STDOUT AT A
// FIXED 100ms CADENCE, LOGGING EACH WRITE'S (t_ms, sleep_ms, size) TO A
// REPLAY LOG. GROUNDED ON generator2.c (THREE-REGIME: NORMAL/BURST/HUNGER)
// WITH `--legacy` FALLING BACK TO generator.c'S SINGLE-REGIME, SELF-TERMINATING
// BEHAVIOR.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;

use bytepace::{clock, log_info, logformat::LogRecord};

const BUF_NORMAL_SIZE: usize = 100 * 1024;
const BUF_BURST_SIZE: usize = BUF_NORMAL_SIZE * 2;
const BUF_HUNGER_SIZE: usize = BUF_NORMAL_SIZE / 10;
const FIXED_SLEEP_MS: u64 = 100;
const LEGACY_SELF_TERMINATE_MS: u64 = 20 * 1000;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(about = "Generates bursty traffic on stdout and records a replayable log")]
struct Args {
    /// Where to record the (time, sleep, size) schedule for bytereplay.
    #[arg(short = 'l', long, default_value = "generator.log")]
    log: String,

    /// Reproduce generator.c's single-regime, self-terminating behavior
    /// instead of the default three-regime (normal/burst/hunger) generator.
    #[arg(long)]
    legacy: bool,

    /// Only meaningful with --legacy: stop after this many seconds.
    #[arg(long, default_value_t = LEGACY_SELF_TERMINATE_MS / 1000)]
    run_secs: u64,
}

/// A tiny xorshift PRNG: no external dependency is warranted for traffic
/// that only needs to look bursty, not to be cryptographically random.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            (self.next_u64() % bound as u64) as usize
        }
    }
}

fn pick_size(rng: &mut Rng, legacy: bool) -> usize {
    if legacy {
        return rng.below(BUF_NORMAL_SIZE);
    }
    match rng.below(10) {
        1 | 2 => BUF_NORMAL_SIZE + rng.below(BUF_BURST_SIZE - BUF_NORMAL_SIZE),
        3 | 4 => rng.below(BUF_HUNGER_SIZE),
        _ => rng.below(BUF_NORMAL_SIZE),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    bytepace::shutdown::install(&SHUTDOWN)?;

    let log_file = File::create(&args.log)
        .with_context(|| format!("cannot open '{}' for writing", args.log))?;
    let mut log = BufWriter::new(log_file);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let seed = clock::now().micros.max(1) ^ ((std::process::id() as u64) << 32);
    let mut rng = Rng::new(seed);
    let mut counter: u8 = 0;

    let t_start = clock::now();
    log_info!(
        "generating {} traffic, logging schedule to '{}'",
        if args.legacy { "single-regime" } else { "three-regime" },
        args.log
    );

    loop {
        if bytepace::shutdown::requested(&SHUTDOWN) {
            break;
        }

        let size = pick_size(&mut rng, args.legacy);
        let mut buf = vec![0u8; size];
        counter = bytepace::logformat::fill_counter_payload(&mut buf, counter);

        out.write_all(&buf).context("writing generated traffic")?;
        bytepace::pacer::sleep_us(FIXED_SLEEP_MS * 1000);

        let t_ms = clock::diff_ms(t_start, clock::now());
        LogRecord {
            t_ms,
            sleep_ms: FIXED_SLEEP_MS,
            size,
        }
        .write_to(&mut log)?;
        log.flush()?;

        if args.legacy && t_ms >= args.run_secs * 1000 {
            break;
        }
    }

    out.flush()?;
    log_info!("generator stopped");
    Ok(())
}
