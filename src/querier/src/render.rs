//! Render pipeline: parse and materialize the targets, run them under the
//! governor and format the result.

use std::sync::Arc;
use std::time::Instant;

use crate::evaluation::{EvaluationContext, EvaluationError, QueryWindow};
use crate::expression::{ParseError, parse};
use crate::format::{FormatError, OutputFormat, RenderOptions, Rendered, ValueFormatter, format_series};
use crate::functions::FunctionRegistry;
use crate::governor::{Governor, Outcome};
use crate::target::{MaterializeError, Target, materialize};
use common::expected_len;

const DEFAULT_NATIVE_STEP: i64 = 60;
const DEFAULT_MAX_DATA_POINTS: usize = 1_000_000;

/// Validated inputs of one render request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParameters {
    pub tenant: String,
    pub targets: Vec<String>,
    pub from: i64,
    pub until: i64,
    pub format: OutputFormat,
    /// The client asked for `valueFormat=human`
    pub human_readable: bool,
    pub log_base: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Could not parse target: {target} ({source})")]
    Parse {
        target: String,
        #[source]
        source: ParseError,
    },

    #[error("Evaluation failed: {0}")]
    Evaluation(#[source] EvaluationError),

    #[error("Scale incompatibility: {0}")]
    ScaleIncompatibility(String),

    #[error("Render request timed out")]
    TimedOut,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RenderError {
    /// Whether the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidParameter(_)
                | RenderError::Parse { .. }
                | RenderError::Evaluation(_)
                | RenderError::ScaleIncompatibility(_)
        )
    }
}

impl From<MaterializeError> for RenderError {
    fn from(err: MaterializeError) -> Self {
        RenderError::InvalidParameter(err.to_string())
    }
}

impl From<FormatError> for RenderError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::ScaleIncompatibility(msg) => RenderError::ScaleIncompatibility(msg),
            FormatError::Serialization(e) => RenderError::Internal(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct RenderService {
    governor: Governor,
    human_readable_numbers: bool,
    native_step: i64,
    max_data_points: usize,
}

impl RenderService {
    /// `human_readable_numbers` enables `valueFormat=human`; without it
    /// values are always written in machine form.
    pub fn new(governor: Governor, human_readable_numbers: bool) -> Self {
        Self {
            governor,
            human_readable_numbers,
            native_step: DEFAULT_NATIVE_STEP,
            max_data_points: DEFAULT_MAX_DATA_POINTS,
        }
    }

    /// Rejects windows holding more than `max_data_points` samples at
    /// `native_step`.
    pub fn with_window_limit(mut self, native_step: i64, max_data_points: usize) -> Self {
        self.native_step = native_step.max(1);
        self.max_data_points = max_data_points;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        self.governor.evaluator().registry()
    }

    fn validate(&self, params: &RenderParameters) -> Result<(), RenderError> {
        if params.targets.is_empty() {
            return Err(RenderError::InvalidParameter(
                "missing required parameter 'target'".to_string(),
            ));
        }
        if params.from >= params.until {
            return Err(RenderError::InvalidParameter(format!(
                "'from' ({}) must be before 'until' ({})",
                params.from, params.until
            )));
        }
        let points = expected_len(params.from, params.until, self.native_step);
        if points > self.max_data_points {
            return Err(RenderError::InvalidParameter(format!(
                "window [{}, {}) spans {points} data points, more than the limit of {}",
                params.from, params.until, self.max_data_points
            )));
        }
        match params.log_base {
            Some(base) if !(base > 1.0) => Err(RenderError::InvalidParameter(format!(
                "logBase must be greater than 1, got {base}"
            ))),
            _ => Ok(()),
        }
    }

    fn prepare_targets(
        &self,
        params: &RenderParameters,
        ctx: &EvaluationContext,
    ) -> Result<Vec<Target>, RenderError> {
        params
            .targets
            .iter()
            .map(|text| -> Result<Target, RenderError> {
                let tree = parse(text).map_err(|source| RenderError::Parse {
                    target: text.clone(),
                    source,
                })?;
                Ok(materialize(&tree, ctx, self.registry())?)
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(tenant = %params.tenant, targets = params.targets.len()))]
    pub async fn render(&self, params: RenderParameters) -> Result<Rendered, RenderError> {
        self.validate(&params)?;
        tracing::debug!(from = params.from, until = params.until, "Render request received");
        let started = Instant::now();

        let formatter = if self.human_readable_numbers && params.human_readable {
            ValueFormatter::Human
        } else {
            ValueFormatter::Machine
        };
        let ctx = Arc::new(EvaluationContext::new(
            QueryWindow {
                tenant: params.tenant.clone(),
                from: params.from,
                until: params.until,
            },
            formatter,
        ));
        let targets = self.prepare_targets(&params, &ctx)?;

        match self.governor.execute(&params.tenant, targets, Arc::clone(&ctx)).await {
            Outcome::Completed(series) => {
                let options = RenderOptions {
                    format: params.format,
                    log_base: params.log_base,
                };
                let rendered = format_series(&series, &options, ctx.formatter())?;
                tracing::info!(
                    series = series.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render request completed"
                );
                Ok(rendered)
            }
            Outcome::Failed(e) => Err(RenderError::Evaluation(e)),
            Outcome::TimedOut => Err(RenderError::TimedOut),
            Outcome::Internal(message) => Err(RenderError::Internal(message)),
        }
    }
}
