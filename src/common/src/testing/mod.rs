//! Test utilities for Graphene.
//!
//! Reusable builders for test configurations and pre-seeded in-memory
//! collaborators.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{SeriesFixture, TestConfigBuilder};
//!
//! let config = TestConfigBuilder::new().with_request_timeout_ms(200).build();
//! let (store, index) = SeriesFixture::new(60)
//!     .series("acme", "metric.a", 0, &[Some(1.0), Some(2.0)])
//!     .build();
//! ```

mod config_builder;
mod fixtures;

pub use config_builder::TestConfigBuilder;
pub use fixtures::SeriesFixture;

pub use crate::index::MockMetricIndex;
pub use crate::stats::MockStatsSink;
pub use crate::storage::MockMetricStore;
pub use crate::throttling::MockThrottler;
