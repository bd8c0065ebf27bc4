//! Structured logging.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter comes from `CONCORD_LOG` (falling back to `info`); `json`
/// switches to line-delimited JSON output for log shippers. Calling this
/// twice is a no-op: the second initialization fails quietly.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("CONCORD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
