//! Shared tracing setup for the chainwatch binaries.

mod subscriber;

pub use subscriber::{init_tracing, init_tracing_with_level};
