//! Logging setup and helpers

use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`.
/// Calling this more than once is harmless.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Render run and tool timings for log fields
///
/// Sub-second timings keep millisecond precision, tool calls up to a minute
/// show tenths of a second, and longer runs are split into clock units.
///
/// ```rust
/// use orchestrator::logging::format_elapsed;
/// use std::time::Duration;
///
/// assert_eq!(format_elapsed(Duration::from_millis(1520)), "1.5s");
/// assert_eq!(format_elapsed(Duration::from_secs(3725)), "1h02m05s");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0 => format!("{}ms", elapsed.as_millis()),
        1..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m{:02}s", secs / 3600, (secs / 60) % 60, secs % 60),
    }
}
