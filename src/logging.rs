// AMBIENT LOGGING
// THIN eprintln! WRAPPERS WITH A MODULE TAG AND A MONOTONIC TIMESTAMP PREFIX.
// NOT A DIAGNOSTICS FRAMEWORK -- THESE ARE STDERR LINES FOR A PIPELINE FILTER,
// THE SAME REGISTER AS THE ORIGINAL TOOLS' fprintf(stderr, ...) CALLS.

/// Milliseconds since an arbitrary fixed epoch, used only to order log lines.
pub fn stamp_ms() -> u64 {
    let t = crate::clock::now();
    t.secs * 1000 + t.micros / 1000
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        eprintln!("[{}] {}", $crate::logging::stamp_ms(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[{}] WARN: {}", $crate::logging::stamp_ms(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        eprintln!("[{}] ERROR: {}", $crate::logging::stamp_ms(), format!($($arg)*))
    };
}
