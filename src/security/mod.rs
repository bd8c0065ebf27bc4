//! Payload sanitization.
//!
//! The working-memory write path hands every payload to a sanitizer before
//! it is persisted. The detection logic itself is pluggable; this module
//! provides the seam plus a regex-based default.

mod sanitizer;

pub use sanitizer::{NoopSanitizer, PayloadSanitizer, RegexSanitizer, SanitizeReport};
