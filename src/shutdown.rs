// SIGNAL-DRIVEN SHUTDOWN
// "SET FLAG IN SIGNAL HANDLER, OBSERVE IN MAIN LOOP" -- SAME PATTERN AS
// main.rs::SHUTDOWN / cli/probe.rs::RUNNING IN THE TEACHER, GENERALIZED INTO
// ONE HELPER SHARED BY EVERY BINARY IN THIS CRATE.

use std::sync::atomic::{AtomicBool, Ordering};

/// Installs a `SIGINT` handler that flips `flag` to `true`. The producer (or
/// whichever loop owns the only suspension point) checks the flag between
/// iterations and exits after flushing its final work; no attempt is made to
/// interrupt a blocking `read` or `write` in progress.
pub fn install(flag: &'static AtomicBool) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })?;
    Ok(())
}

pub fn requested(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}
