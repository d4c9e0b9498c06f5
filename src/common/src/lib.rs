pub mod cli;
pub mod config;
pub mod index;
pub mod model;
pub mod stats;
pub mod storage;
pub mod throttling;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use model::{TimeSeries, expected_len, parse_interval};
