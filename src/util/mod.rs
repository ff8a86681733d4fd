//! Utility modules for wmibeat.

mod duration;

pub use duration::{DurationParseError, parse_duration};
