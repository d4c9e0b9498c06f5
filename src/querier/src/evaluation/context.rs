use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use common::TimeSeries;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use super::{EvalResult, EvaluationError};
use crate::format::ValueFormatter;

/// Tenant and time window every selector of a request reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub tenant: String,
    pub from: i64,
    pub until: i64,
}

/// Per-request evaluation state, dropped when the request completes.
#[derive(Debug)]
pub struct EvaluationContext {
    window: QueryWindow,
    formatter: ValueFormatter,
    deadline: OnceLock<Instant>,
    memo: MemoCache,
}

impl EvaluationContext {
    pub fn new(window: QueryWindow, formatter: ValueFormatter) -> Self {
        Self {
            window,
            formatter,
            deadline: OnceLock::new(),
            memo: MemoCache::default(),
        }
    }

    pub fn window(&self) -> &QueryWindow {
        &self.window
    }

    pub fn tenant(&self) -> &str {
        &self.window.tenant
    }

    pub fn formatter(&self) -> ValueFormatter {
        self.formatter
    }

    /// Sets the cancellation deadline. Only the first call has an effect.
    pub fn set_deadline(&self, deadline: Instant) -> bool {
        self.deadline.set(deadline).is_ok()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Cooperative cancellation checkpoint.
    pub fn check_deadline(&self) -> EvalResult<()> {
        match self.deadline.get() {
            Some(deadline) if Instant::now() >= *deadline => Err(EvaluationError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn memo(&self) -> &MemoCache {
        &self.memo
    }

    /// Number of distinct sub-expressions computed so far.
    pub fn computed_expressions(&self) -> usize {
        self.memo.computed.load(Ordering::Relaxed)
    }
}

/// Get-or-compute cache keyed by normalized expression text.
///
/// Concurrent requests for the same key wait for the single computation in
/// flight. Failures are not cached.
#[derive(Debug, Default)]
pub(crate) struct MemoCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Vec<TimeSeries>>>>>,
    computed: AtomicUsize,
}

impl MemoCache {
    pub(crate) async fn get_or_try_compute<F, Fut>(
        &self,
        key: String,
        compute: F,
    ) -> EvalResult<Vec<TimeSeries>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EvalResult<Vec<TimeSeries>>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(key).or_default().clone()
        };
        let series = cell
            .get_or_try_init(|| {
                self.computed.fetch_add(1, Ordering::Relaxed);
                compute()
            })
            .await?;
        Ok(series.clone())
    }
}
