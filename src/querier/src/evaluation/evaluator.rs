use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::TimeSeries;
use common::index::MetricIndex;
use common::storage::MetricStore;
use futures::future::try_join_all;

use super::{EvalResult, EvaluationContext, EvaluationError};
use crate::functions::{Argument, FunctionRegistry};
use crate::target::{FunctionCall, Literal, SeriesSelector, Target};

/// Recursive interpreter over materialized targets.
///
/// Cheap to clone; all state shared between requests sits behind `Arc`s and
/// per-request state lives in the [`EvaluationContext`].
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn MetricStore>,
    index: Arc<dyn MetricIndex>,
    registry: Arc<FunctionRegistry>,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn MetricStore>,
        index: Arc<dyn MetricIndex>,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            store,
            index,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Evaluates `targets` concurrently and concatenates their series in
    /// target order. The first failure fails the whole batch.
    pub async fn evaluate_all(
        &self,
        targets: &[Target],
        ctx: &EvaluationContext,
    ) -> EvalResult<Vec<TimeSeries>> {
        let results = try_join_all(targets.iter().map(|target| self.evaluate(target, ctx))).await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Evaluates one target, memoized per request by its normalized text.
    ///
    /// Uses `Box::pin` to recurse through nested calls.
    pub fn evaluate<'a>(
        &'a self,
        target: &'a Target,
        ctx: &'a EvaluationContext,
    ) -> Pin<Box<dyn Future<Output = EvalResult<Vec<TimeSeries>>> + Send + 'a>> {
        Box::pin(async move {
            ctx.check_deadline()?;
            match target {
                Target::SeriesSelector(selector) => {
                    ctx.memo()
                        .get_or_try_compute(target.to_string(), || self.fetch(selector, ctx))
                        .await
                }
                Target::FunctionCall(call) => {
                    ctx.memo()
                        .get_or_try_compute(target.to_string(), || self.apply(call, ctx))
                        .await
                }
                Target::Literal(_) => Err(EvaluationError::NotEvaluable {
                    expression: target.to_string(),
                }),
            }
        })
    }

    async fn fetch(
        &self,
        selector: &SeriesSelector,
        ctx: &EvaluationContext,
    ) -> EvalResult<Vec<TimeSeries>> {
        let paths = self
            .index
            .resolve_pattern(&selector.tenant, &selector.path_pattern)
            .await?;
        tracing::debug!(
            tenant = %selector.tenant,
            pattern = %selector.path_pattern,
            resolved = paths.len(),
            "Resolved series selector"
        );
        ctx.check_deadline()?;

        let series = try_join_all(paths.iter().map(|path| {
            self.store
                .fetch_series(&selector.tenant, path, selector.from, selector.until)
        }))
        .await?;
        Ok(series)
    }

    async fn apply(&self, call: &FunctionCall, ctx: &EvaluationContext) -> EvalResult<Vec<TimeSeries>> {
        let spec = self
            .registry
            .get(&call.name)
            .ok_or_else(|| EvaluationError::UnknownFunction {
                name: call.name.clone(),
            })?;
        spec.check_arity(call.args.len())
            .map_err(|reason| EvaluationError::InvalidArguments {
                function: call.name.clone(),
                reason,
            })?;

        let args = try_join_all(call.args.iter().map(|arg| self.argument(arg, ctx))).await?;
        ctx.check_deadline()?;

        let series = (spec.apply)(call, args)?;
        debug_assert!(series.iter().all(TimeSeries::is_well_formed));
        Ok(series)
    }

    async fn argument(&self, target: &Target, ctx: &EvaluationContext) -> EvalResult<Argument> {
        Ok(match target {
            Target::Literal(Literal::Number(value)) => Argument::Number(*value),
            Target::Literal(Literal::String(value)) => Argument::String(value.clone()),
            Target::Literal(Literal::Bool(value)) => Argument::Bool(*value),
            _ => Argument::Series(self.evaluate(target, ctx).await?),
        })
    }
}
