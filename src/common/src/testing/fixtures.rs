//! Pre-seeded in-memory store and index for evaluator and endpoint tests.

use std::sync::Arc;

use crate::index::InMemoryMetricIndex;
use crate::storage::InMemoryMetricStore;

/// Builds an [`InMemoryMetricStore`] and a matching index from literal
/// sample vectors.
pub struct SeriesFixture {
    store: Arc<InMemoryMetricStore>,
}

impl SeriesFixture {
    pub fn new(step: i64) -> Self {
        Self {
            store: Arc::new(InMemoryMetricStore::new(step)),
        }
    }

    /// Stores `values` for `path`, the first one at `start`, one per step.
    /// `None` entries are left unwritten.
    pub fn series(self, tenant: &str, path: &str, start: i64, values: &[Option<f64>]) -> Self {
        let step = self.store.step();
        for (i, value) in values.iter().enumerate() {
            if let Some(value) = value {
                self.store
                    .insert(tenant, path, start + i as i64 * step, *value);
            }
        }
        self
    }

    pub fn build(self) -> (Arc<InMemoryMetricStore>, Arc<InMemoryMetricIndex>) {
        let index = Arc::new(InMemoryMetricIndex::backed_by(self.store.clone()));
        (self.store, index)
    }
}
