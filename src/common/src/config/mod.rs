use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Settings for the render path: HTTP bind address, evaluation budget and
/// number formatting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Address the HTTP server listens on
    pub bind: String,
    /// Wall-clock budget for evaluating all targets of one render request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Allow clients to request human-readable (SI-scaled) numbers
    pub human_readable_numbers: bool,
    /// Size of the evaluation pool shared by all requests
    pub max_concurrent_evaluations: usize,
    /// Largest render window accepted, in samples at the native step
    pub max_data_points: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            human_readable_numbers: false,
            max_concurrent_evaluations: 64,
            max_data_points: 1_000_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of paths returned by the search endpoint
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

/// In-memory storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Native sampling interval of stored series
    #[serde(with = "humantime_serde")]
    pub native_step: Duration,
    /// Optional file in `path value timestamp` line format loaded at startup
    pub seed_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            native_step: Duration::from_secs(60),
            seed_file: None,
        }
    }
}

/// Per-tenant admission throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    pub enabled: bool,
    /// Queries per second granted to tenants without an explicit rate
    pub default_rate: f64,
    /// Explicit per-tenant rates (queries per second)
    #[serde(default)]
    pub tenants: HashMap<String, f64>,
    /// Tenants that are never throttled
    #[serde(default)]
    pub exceptions: Vec<String>,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_rate: 100.0,
            tenants: HashMap::new(),
            exceptions: Vec::new(),
        }
    }
}

impl ThrottlingConfig {
    pub fn rate_for(&self, tenant: &str) -> Option<f64> {
        if !self.enabled || self.exceptions.iter().any(|t| t == tenant) {
            return None;
        }
        Some(
            self.tenants
                .get(tenant)
                .copied()
                .unwrap_or(self.default_rate),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Periodically log a snapshot of the per-tenant counters
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub reader: ReaderConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub throttling: ThrottlingConfig,
    pub stats: StatsConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file("graphene.toml"))
            .merge(Env::prefixed("GRAPHENE__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRAPHENE__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
