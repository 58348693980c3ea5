//! Shared helpers: tracing setup, wire timestamps

pub mod time;
pub mod tracing;

pub use time::{format_timestamp, parse_timestamp, TimestampError};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
