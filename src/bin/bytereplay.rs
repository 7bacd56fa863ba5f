// DETERMINISTIC REPLAYER
// READS A generator.log SCHEDULE AND RE-EMITS THE EXACT SAME SEQUENCE OF
// WRITE SIZES AND SLEEP INTERVALS TO STDOUT, REGENERATING THE WRAPPING
// COUNTER PAYLOAD FROM SCRATCH. GROUNDED ON generator-clone.c.

use std::fs::File;
use std::io::{BufReader, Write};

use anyhow::{Context, Result};
use clap::Parser;

use bytepace::{log_info, logformat};

#[derive(Parser, Debug)]
#[command(about = "Replays a generator.log schedule to stdout")]
struct Args {
    /// Log file produced by bytegen.
    log: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_file =
        File::open(&args.log).with_context(|| format!("cannot open '{}' for reading", args.log))?;
    let records = logformat::read_all(BufReader::new(log_file))?;

    log_info!("replaying {} records from '{}'", records.len(), args.log);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut counter: u8 = 0;

    for record in &records {
        let mut buf = vec![0u8; record.size];
        counter = logformat::fill_counter_payload(&mut buf, counter);

        out.write_all(&buf).context("writing replayed traffic")?;
        bytepace::pacer::sleep_us(record.sleep_ms * 1000);
    }

    out.flush()?;
    log_info!("replay finished");
    Ok(())
}
