//! Functions selecting, ranking or masking series without combining them.

use std::cmp::Ordering;

use common::TimeSeries;
use regex::Regex;

use super::{Args, Argument, FunctionRegistry, FunctionSpec};
use crate::evaluation::EvalResult;
use crate::target::FunctionCall;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("highestMax", FunctionSpec::new(2, Some(2), highest_max));
    registry.register("highestAverage", FunctionSpec::new(2, Some(2), highest_average));
    registry.register("lowestAverage", FunctionSpec::new(2, Some(2), lowest_average));
    registry.register("limit", FunctionSpec::new(2, Some(2), limit));
    registry.register("exclude", FunctionSpec::new(2, Some(2), exclude));
    registry.register("grep", FunctionSpec::new(2, Some(2), grep));
    registry.register("removeAboveValue", FunctionSpec::new(2, Some(2), remove_above_value));
    registry.register("removeBelowValue", FunctionSpec::new(2, Some(2), remove_below_value));
    registry.register("sortByName", FunctionSpec::new(1, Some(1), sort_by_name));
}

fn max_of(series: &TimeSeries) -> Option<f64> {
    series.present().reduce(f64::max)
}

fn average_of(series: &TimeSeries) -> Option<f64> {
    let (sum, count) = series
        .present()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Keeps the `n` best series by `key`, best first. Series without any
/// present value rank last; ties keep their input order.
fn rank(
    series: Vec<TimeSeries>,
    n: usize,
    key: fn(&TimeSeries) -> Option<f64>,
    highest: bool,
) -> Vec<TimeSeries> {
    let mut keyed: Vec<(Option<f64>, TimeSeries)> =
        series.into_iter().map(|s| (key(&s), s)).collect();
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) if highest => b.total_cmp(a),
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    keyed.into_iter().take(n).map(|(_, s)| s).collect()
}

fn ranked(
    call: &FunctionCall,
    args: Vec<Argument>,
    key: fn(&TimeSeries) -> Option<f64>,
    highest: bool,
) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let n = args.count(1)?;
    Ok(rank(series, n, key, highest))
}

fn highest_max(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    ranked(call, args, max_of, true)
}

fn highest_average(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    ranked(call, args, average_of, true)
}

fn lowest_average(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    ranked(call, args, average_of, false)
}

fn limit(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let n = args.count(1)?;
    Ok(series.into_iter().take(n).collect())
}

fn filter_by_name(
    call: &FunctionCall,
    args: Vec<Argument>,
    keep_matches: bool,
) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let pattern = args.string(1)?;
    let regex = Regex::new(&pattern)
        .map_err(|e| args.invalid(format!("invalid regex '{pattern}': {e}")))?;
    Ok(series
        .into_iter()
        .filter(|s| regex.is_match(&s.name) == keep_matches)
        .collect())
}

fn exclude(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    filter_by_name(call, args, false)
}

fn grep(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    filter_by_name(call, args, true)
}

fn mask(
    call: &FunctionCall,
    args: Vec<Argument>,
    keep: fn(f64, f64) -> bool,
) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let threshold = args.number(1)?;
    Ok(series
        .iter()
        .map(|s| {
            let values = s
                .values
                .iter()
                .map(|v| v.filter(|&v| keep(v, threshold)))
                .collect();
            s.with_values(format!("{}({},{threshold})", call.name, s.name), values)
        })
        .collect())
}

fn remove_above_value(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    mask(call, args, |v, threshold| v <= threshold)
}

fn remove_below_value(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    mask(call, args, |v, threshold| v >= threshold)
}

fn sort_by_name(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut series = Args::new(call, args).series(0)?;
    series.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(series)
}
