//! Execution governor: admission throttling, request stats, the bounded
//! evaluation pool and the request deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::TimeSeries;
use common::stats::StatsSink;
use common::throttling::Throttler;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::evaluation::{EvaluationContext, EvaluationError, Evaluator};
use crate::target::Target;

/// Bounded pool of evaluation tasks.
///
/// Submitted work runs on its own tokio task once a permit is free; time
/// spent waiting for a permit counts against the caller's deadline.
#[derive(Debug, Clone)]
pub struct EvaluationPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl EvaluationPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by running work.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn submit<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await;
            work.await
        })
    }
}

/// Result of one governed render evaluation.
#[derive(Debug)]
pub enum Outcome {
    Completed(Vec<TimeSeries>),
    Failed(EvaluationError),
    TimedOut,
    Internal(String),
}

#[derive(Clone)]
pub struct Governor {
    evaluator: Evaluator,
    pool: EvaluationPool,
    throttler: Arc<dyn Throttler>,
    stats: Arc<dyn StatsSink>,
    request_timeout: Duration,
}

impl Governor {
    pub fn new(
        evaluator: Evaluator,
        pool: EvaluationPool,
        throttler: Arc<dyn Throttler>,
        stats: Arc<dyn StatsSink>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            pool,
            throttler,
            stats,
            request_timeout,
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Runs `targets` for `tenant` under throttling and the request deadline.
    ///
    /// On timeout the evaluation task is left running; it stops at its next
    /// deadline checkpoint.
    pub async fn execute(
        &self,
        tenant: &str,
        targets: Vec<Target>,
        ctx: Arc<EvaluationContext>,
    ) -> Outcome {
        let decision = self.throttler.throttle(tenant).await;
        if decision.is_throttled() {
            self.stats.inc_throttle_time(tenant, decision.delay);
        }
        self.stats.inc_render_requests(tenant);

        let deadline = Instant::now() + self.request_timeout;
        ctx.set_deadline(deadline);

        let evaluator = self.evaluator.clone();
        let task_ctx = Arc::clone(&ctx);
        let handle = self
            .pool
            .submit(async move { evaluator.evaluate_all(&targets, &task_ctx).await });

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(Ok(series))) => Outcome::Completed(series),
            Ok(Ok(Err(EvaluationError::Cancelled))) | Err(_) => {
                tracing::debug!(
                    tenant,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Render request timed out"
                );
                self.stats.inc_timed_out_requests(tenant);
                Outcome::TimedOut
            }
            Ok(Ok(Err(e))) if e.is_internal() => {
                tracing::error!(tenant, error = %e, "Render evaluation failed");
                Outcome::Internal(e.to_string())
            }
            Ok(Ok(Err(e))) => Outcome::Failed(e),
            Ok(Err(join_error)) => {
                tracing::error!(tenant, error = %join_error, "Render evaluation task failed");
                Outcome::Internal(join_error.to_string())
            }
        }
    }
}
