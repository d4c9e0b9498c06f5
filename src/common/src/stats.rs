//! Process-wide per-tenant request statistics.
//!
//! Counters only ever grow; each one is updated atomically on its own, no
//! cross-counter consistency is promised to readers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

/// Fire-and-forget stats collaborator.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait StatsSink: Send + Sync + 'static {
    fn inc_render_requests(&self, tenant: &str);
    fn inc_paths_requests(&self, tenant: &str);
    fn inc_throttle_time(&self, tenant: &str, delay: Duration);
    fn inc_timed_out_requests(&self, tenant: &str);
}

#[derive(Debug, Default)]
struct TenantCounters {
    render_requests: AtomicU64,
    paths_requests: AtomicU64,
    throttle_time_nanos: AtomicU64,
    timed_out_requests: AtomicU64,
}

/// Point-in-time copy of one tenant's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    pub render_requests: u64,
    pub paths_requests: u64,
    pub throttle_time: Duration,
    pub timed_out_requests: u64,
}

impl From<&TenantCounters> for TenantStats {
    fn from(counters: &TenantCounters) -> Self {
        Self {
            render_requests: counters.render_requests.load(Ordering::Relaxed),
            paths_requests: counters.paths_requests.load(Ordering::Relaxed),
            throttle_time: Duration::from_nanos(
                counters.throttle_time_nanos.load(Ordering::Relaxed),
            ),
            timed_out_requests: counters.timed_out_requests.load(Ordering::Relaxed),
        }
    }
}

/// Registry of per-tenant counters, created once at startup.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    tenants: RwLock<HashMap<String, Arc<TenantCounters>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, tenant: &str) -> Arc<TenantCounters> {
        {
            let tenants = match self.tenants.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(counters) = tenants.get(tenant) {
                return counters.clone();
            }
        }
        let mut tenants = match self.tenants.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants.entry(tenant.to_string()).or_default().clone()
    }

    pub fn tenant(&self, tenant: &str) -> TenantStats {
        let tenants = match self.tenants.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .get(tenant)
            .map(|c| TenantStats::from(c.as_ref()))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TenantStats> {
        let tenants = match self.tenants.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .iter()
            .map(|(tenant, c)| (tenant.clone(), TenantStats::from(c.as_ref())))
            .collect()
    }

    /// Logs a snapshot every `interval` until the returned task is aborted.
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.report();
            }
        })
    }

    pub fn report(&self) {
        for (tenant, stats) in self.snapshot() {
            tracing::info!(
                tenant = %tenant,
                render_requests = stats.render_requests,
                paths_requests = stats.paths_requests,
                throttle_time_ms = stats.throttle_time.as_millis() as u64,
                timed_out_requests = stats.timed_out_requests,
                "Tenant request stats"
            );
        }
    }
}

impl StatsSink for StatsRegistry {
    fn inc_render_requests(&self, tenant: &str) {
        self.counters(tenant)
            .render_requests
            .fetch_add(1, Ordering::Relaxed);
    }

    fn inc_paths_requests(&self, tenant: &str) {
        self.counters(tenant)
            .paths_requests
            .fetch_add(1, Ordering::Relaxed);
    }

    fn inc_throttle_time(&self, tenant: &str, delay: Duration) {
        self.counters(tenant)
            .throttle_time_nanos
            .fetch_add(u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    fn inc_timed_out_requests(&self, tenant: &str) {
        self.counters(tenant)
            .timed_out_requests
            .fetch_add(1, Ordering::Relaxed);
    }
}
