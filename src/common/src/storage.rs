//! Storage collaborator: the read side of the time-series store.
//!
//! The query engine only ever calls [`MetricStore::fetch_series`]. The
//! in-memory implementation keeps samples on a fixed native step and can be
//! seeded from the `path value timestamp` line format written by the
//! ingestion service.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::model::{TimeSeries, expected_len};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read series '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to stored series for one concrete metric path.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Returns the native-step samples of `path` over `[from, until)`.
    ///
    /// The series is named after `path` and always satisfies the window
    /// length invariant; paths without data yield an all-absent series.
    async fn fetch_series(
        &self,
        tenant: &str,
        path: &str,
        from: i64,
        until: i64,
    ) -> StorageResult<TimeSeries>;
}

/// One parsed line of the plaintext ingestion format.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaintextSample {
    pub path: String,
    pub value: f64,
    pub timestamp: i64,
}

/// Parses `metricPath numericValue unixTimestamp`.
pub fn parse_plaintext_line(line: &str) -> Option<PlaintextSample> {
    let mut parts = line.split_whitespace();
    let path = parts.next()?;
    let value = parts.next()?.parse::<f64>().ok()?;
    let timestamp = parts.next()?.parse::<f64>().ok()? as i64;
    if parts.next().is_some() || !value.is_finite() {
        return None;
    }
    Some(PlaintextSample {
        path: path.to_string(),
        value,
        timestamp,
    })
}

type TenantSeries = HashMap<String, BTreeMap<i64, f64>>;

/// Process-local store keeping one sample per native step slot.
#[derive(Debug)]
pub struct InMemoryMetricStore {
    step: i64,
    tenants: RwLock<HashMap<String, TenantSeries>>,
}

impl InMemoryMetricStore {
    pub fn new(step: i64) -> Self {
        Self {
            step: step.max(1),
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Stores a sample, flooring its timestamp to the native step. A later
    /// write to the same slot wins.
    pub fn insert(&self, tenant: &str, path: &str, timestamp: i64, value: f64) {
        let slot = timestamp.div_euclid(self.step) * self.step;
        let mut tenants = match self.tenants.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .entry(tenant.to_string())
            .or_default()
            .entry(path.to_string())
            .or_default()
            .insert(slot, value);
    }

    /// All paths stored for `tenant`, sorted.
    pub fn paths(&self, tenant: &str) -> Vec<String> {
        let tenants = match self.tenants.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut paths: Vec<String> = tenants
            .get(tenant)
            .map(|series| series.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Loads plaintext lines for `tenant`, skipping malformed ones.
    ///
    /// Returns the number of samples stored.
    pub fn load_plaintext(&self, tenant: &str, contents: &str) -> usize {
        let mut loaded = 0;
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_plaintext_line(line) {
                Some(sample) => {
                    self.insert(tenant, &sample.path, sample.timestamp, sample.value);
                    loaded += 1;
                }
                None => log::warn!("Skipping malformed line {}: '{}'", number + 1, line),
            }
        }
        loaded
    }

    pub fn load_plaintext_file(&self, tenant: &str, path: &Path) -> StorageResult<usize> {
        let contents = std::fs::read_to_string(path)?;
        let loaded = self.load_plaintext(tenant, &contents);
        log::info!(
            "Loaded {} samples for tenant '{}' from {}",
            loaded,
            tenant,
            path.display()
        );
        Ok(loaded)
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn fetch_series(
        &self,
        tenant: &str,
        path: &str,
        from: i64,
        until: i64,
    ) -> StorageResult<TimeSeries> {
        let len = expected_len(from, until, self.step);
        let mut values = vec![None; len];

        let tenants = self.tenants.read().map_err(|_| StorageError::ReadFailed {
            path: path.to_string(),
            reason: "store lock poisoned".to_string(),
        })?;

        if let Some(samples) = tenants.get(tenant).and_then(|series| series.get(path)) {
            let first_slot = from.div_euclid(self.step) * self.step;
            // Slot i of the window covers the native slot containing from + i * step.
            for (&slot, &value) in samples.range(first_slot..until) {
                let index = ((slot - first_slot) / self.step) as usize;
                if let Some(cell) = values.get_mut(index) {
                    *cell = Some(value);
                }
            }
        }

        Ok(TimeSeries::new(path, tenant, from, until, self.step, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plaintext_line() {
        assert_eq!(
            parse_plaintext_line("servers.web1.cpu 12.5 1700000000"),
            Some(PlaintextSample {
                path: "servers.web1.cpu".to_string(),
                value: 12.5,
                timestamp: 1_700_000_000,
            })
        );
        assert!(parse_plaintext_line("servers.web1.cpu 12.5").is_none());
        assert!(parse_plaintext_line("servers.web1.cpu abc 1700000000").is_none());
        assert!(parse_plaintext_line("a 1 2 3").is_none());
        assert!(parse_plaintext_line("a nan 2").is_none());
    }

    #[tokio::test]
    async fn test_fetch_series_aligns_samples_to_window() {
        let store = InMemoryMetricStore::new(60);
        store.insert("t", "metric.a", 0, 1.0);
        store.insert("t", "metric.a", 65, 2.0);
        store.insert("t", "metric.a", 180, 4.0);

        let series = store.fetch_series("t", "metric.a", 0, 240).await.unwrap();
        assert_eq!(series.name, "metric.a");
        assert_eq!(series.step, 60);
        assert_eq!(series.values, vec![Some(1.0), Some(2.0), None, Some(4.0)]);
        assert!(series.is_well_formed());
    }

    #[tokio::test]
    async fn test_fetch_series_is_isolated_per_tenant() {
        let store = InMemoryMetricStore::new(60);
        store.insert("acme", "metric.a", 0, 1.0);

        let other = store.fetch_series("other", "metric.a", 0, 120).await.unwrap();
        assert_eq!(other.values, vec![None, None]);
        assert_eq!(other.tenant, "other");
    }

    #[tokio::test]
    async fn test_fetch_series_excludes_samples_outside_window() {
        let store = InMemoryMetricStore::new(60);
        store.insert("t", "m", 0, 1.0);
        store.insert("t", "m", 120, 2.0);
        store.insert("t", "m", 240, 3.0);

        let series = store.fetch_series("t", "m", 60, 240).await.unwrap();
        assert_eq!(series.values, vec![None, Some(2.0), None]);
    }

    #[test]
    fn test_load_plaintext_skips_malformed_lines() {
        let store = InMemoryMetricStore::new(60);
        let loaded = store.load_plaintext(
            "t",
            "# comment\nmetric.a 1 0\nbroken line\nmetric.b 2 60\n\n",
        );
        assert_eq!(loaded, 2);
        assert_eq!(store.paths("t"), vec!["metric.a", "metric.b"]);
    }

    #[test]
    fn test_load_plaintext_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("seed.txt");
        std::fs::write(&file, "metric.a 1 0\nmetric.a 2 60\n").unwrap();

        let store = InMemoryMetricStore::new(60);
        assert_eq!(store.load_plaintext_file("t", &file).unwrap(), 2);
        assert!(store.load_plaintext_file("t", &dir.path().join("missing")).is_err());
    }
}
