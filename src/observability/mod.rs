//! Logging and metrics plumbing.

mod logging;

pub use logging::init_logging;
