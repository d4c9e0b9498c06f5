//! Re-bucketing of series onto a coarser, explicit interval.

use common::{TimeSeries, expected_len, parse_interval};

use super::{Args, Argument, FunctionRegistry, FunctionSpec};
use crate::evaluation::EvalResult;
use crate::target::FunctionCall;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("summarize", FunctionSpec::new(2, Some(4), summarize));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregation {
    Sum,
    Average,
    Max,
    Min,
    Last,
}

impl Aggregation {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" | "total" => Some(Self::Sum),
            "avg" | "average" => Some(Self::Average),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    fn apply(self, values: &[f64]) -> Option<f64> {
        let last = *values.last()?;
        Some(match self {
            Self::Sum => values.iter().sum(),
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Last => last,
        })
    }
}

/// `summarize(series, interval, [func], [alignToFrom])`.
///
/// Buckets start at the window's `from`, so the output honours the window
/// length invariant for the new step whether or not `alignToFrom` is set.
fn summarize(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let interval_text = args.string(1)?;
    let interval = parse_interval(&interval_text)
        .filter(|secs| *secs > 0)
        .ok_or_else(|| args.invalid(format!("invalid interval '{interval_text}'")))?;
    let func = args.opt_string(2)?.unwrap_or_else(|| "sum".to_string());
    let aggregation = Aggregation::parse(&func)
        .ok_or_else(|| args.invalid(format!("unknown aggregation '{func}'")))?;
    let align_to_from = args.opt_bool(3)?.unwrap_or(false);

    Ok(series
        .iter()
        .map(|s| {
            let mut buckets = vec![Vec::new(); expected_len(s.from, s.until, interval)];
            for (i, value) in s.values.iter().enumerate() {
                let Some(value) = value else { continue };
                let bucket = (i as i64 * s.step / interval) as usize;
                if let Some(bucket) = buckets.get_mut(bucket) {
                    bucket.push(*value);
                }
            }
            let values = buckets.iter().map(|b| aggregation.apply(b)).collect();
            let name = if align_to_from {
                format!("summarize({},\"{interval_text}\",\"{func}\",true)", s.name)
            } else {
                format!("summarize({},\"{interval_text}\",\"{func}\")", s.name)
            };
            TimeSeries::new(name, s.tenant.clone(), s.from, s.until, interval, values)
        })
        .collect())
}
