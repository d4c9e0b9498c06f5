//! Functions combining many series into one, point by point.

use common::TimeSeries;

use super::{Args, Argument, FunctionImpl, FunctionRegistry, FunctionSpec, align};
use crate::evaluation::EvalResult;
use crate::target::FunctionCall;

fn variadic(apply: FunctionImpl) -> FunctionSpec {
    FunctionSpec::new(1, None, apply)
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("sumSeries", variadic(sum_series));
    registry.register("sum", variadic(sum_series));
    registry.register("averageSeries", variadic(average_series));
    registry.register("avg", variadic(average_series));
    registry.register("minSeries", variadic(min_series));
    registry.register("maxSeries", variadic(max_series));
    registry.register("rangeOfSeries", variadic(range_of_series));
    registry.register("countSeries", variadic(count_series));
    registry.register("diffSeries", variadic(diff_series));
    registry.register("multiplySeries", variadic(multiply_series));
    registry.register("divideSeries", FunctionSpec::new(2, Some(2), divide_series));
    registry.register("group", variadic(group));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    /// Reduce over the present values; absent only when all are absent
    Skip,
    /// Any absent input makes the point absent
    Propagate,
}

/// Reduces each column of the aligned inputs to one value. The output is
/// named after the call.
fn combine(
    call: &FunctionCall,
    series: Vec<TimeSeries>,
    missing: Missing,
    reduce: impl Fn(&[f64]) -> f64,
) -> EvalResult<Vec<TimeSeries>> {
    if series.is_empty() {
        return Ok(Vec::new());
    }
    let aligned = align(series, &call.name)?;
    let first = &aligned[0];

    let mut column = Vec::with_capacity(aligned.len());
    let values = (0..first.values.len())
        .map(|i| {
            column.clear();
            for s in &aligned {
                match s.values[i] {
                    Some(value) => column.push(value),
                    None if missing == Missing::Propagate => return None,
                    None => {}
                }
            }
            (!column.is_empty()).then(|| reduce(&column))
        })
        .collect();

    Ok(vec![first.with_values(call.to_string(), values)])
}

fn sum_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Skip, |v| v.iter().sum())
}

fn average_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Skip, |v| {
        v.iter().sum::<f64>() / v.len() as f64
    })
}

fn min_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Skip, |v| {
        v.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

fn max_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Skip, |v| {
        v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

fn range_of_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Skip, |v| {
        let min = v.iter().copied().fold(f64::INFINITY, f64::min);
        let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        max - min
    })
}

fn diff_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Propagate, |v| {
        v[0] - v[1..].iter().sum::<f64>()
    })
}

fn multiply_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    combine(call, series, Missing::Propagate, |v| v.iter().product())
}

/// Number of inputs with a value at each point.
fn count_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series_from(0)?;
    if series.is_empty() {
        return Ok(Vec::new());
    }
    let aligned = align(series, &call.name)?;
    let first = &aligned[0];
    let values = (0..first.values.len())
        .map(|i| Some(aligned.iter().filter(|s| s.values[i].is_some()).count() as f64))
        .collect();
    Ok(vec![first.with_values(call.to_string(), values)])
}

/// Divides every dividend by the single divisor series.
fn divide_series(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let dividends = args.series(0)?;
    let divisors = args.series(1)?;
    let [divisor] = divisors.as_slice() else {
        return Err(args.invalid(format!(
            "divisor must be exactly one series, got {}",
            divisors.len()
        )));
    };

    dividends
        .into_iter()
        .map(|dividend| {
            let name = format!("divideSeries({},{})", dividend.name, divisor.name);
            let aligned = align(vec![dividend, divisor.clone()], &call.name)?;
            let values = aligned[0]
                .values
                .iter()
                .zip(&aligned[1].values)
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) if *b != 0.0 => Some(a / b),
                    _ => None,
                })
                .collect();
            Ok(aligned[0].with_values(name, values))
        })
        .collect()
}

fn group(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    Args::new(call, args).series_from(0)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, series, values};
    use super::*;
    use crate::evaluation::EvaluationError;

    fn pair() -> Vec<Argument> {
        vec![
            Argument::Series(vec![series("a", 60, &[Some(1.0), None, Some(3.0), None])]),
            Argument::Series(vec![series("b", 60, &[Some(10.0), Some(20.0), None, None])]),
        ]
    }

    #[test]
    fn test_sum_skips_absent_values() {
        let result = call("sumSeries", pair());
        assert_eq!(values(&result), vec![vec![Some(11.0), Some(20.0), Some(3.0), None]]);
        assert_eq!(result.unwrap()[0].name, "sumSeries(a,b)");
    }

    #[test]
    fn test_aggregates_skip_absent_values() {
        assert_eq!(
            values(&call("averageSeries", pair())),
            vec![vec![Some(5.5), Some(20.0), Some(3.0), None]]
        );
        assert_eq!(
            values(&call("minSeries", pair())),
            vec![vec![Some(1.0), Some(20.0), Some(3.0), None]]
        );
        assert_eq!(
            values(&call("maxSeries", pair())),
            vec![vec![Some(10.0), Some(20.0), Some(3.0), None]]
        );
        assert_eq!(
            values(&call("rangeOfSeries", pair())),
            vec![vec![Some(9.0), Some(0.0), Some(0.0), None]]
        );
    }

    #[test]
    fn test_count_series_counts_present_values() {
        assert_eq!(
            values(&call("countSeries", pair())),
            vec![vec![Some(2.0), Some(1.0), Some(1.0), Some(0.0)]]
        );
    }

    #[test]
    fn test_diff_and_multiply_propagate_absent_values() {
        assert_eq!(
            values(&call("diffSeries", pair())),
            vec![vec![Some(-9.0), None, None, None]]
        );
        assert_eq!(
            values(&call("multiplySeries", pair())),
            vec![vec![Some(10.0), None, None, None]]
        );
    }

    #[test]
    fn test_mixed_steps_are_consolidated() {
        let result = call(
            "sumSeries",
            vec![
                Argument::Series(vec![series("a", 60, &[Some(1.0), Some(3.0)])]),
                Argument::Series(vec![series("b", 120, &[Some(10.0)])]),
            ],
        )
        .unwrap();
        assert_eq!(result[0].step, 120);
        assert_eq!(result[0].values, vec![Some(12.0)]);
    }

    #[test]
    fn test_empty_input_yields_no_series() {
        assert!(call("sumSeries", vec![Argument::Series(vec![])]).unwrap().is_empty());
    }

    #[test]
    fn test_divide_series() {
        let result = call(
            "divideSeries",
            vec![
                Argument::Series(vec![
                    series("a", 60, &[Some(10.0), Some(4.0), None]),
                    series("b", 60, &[Some(1.0), Some(8.0), Some(3.0)]),
                ]),
                Argument::Series(vec![series("d", 60, &[Some(2.0), Some(0.0), Some(3.0)])]),
            ],
        )
        .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "divideSeries(a,d)");
        assert_eq!(result[0].values, vec![Some(5.0), None, None]);
        assert_eq!(result[1].values, vec![Some(0.5), None, Some(1.0)]);
    }

    #[test]
    fn test_divide_series_requires_a_single_divisor() {
        let err = call(
            "divideSeries",
            vec![
                Argument::Series(vec![series("a", 60, &[Some(1.0)])]),
                Argument::Series(vec![
                    series("b", 60, &[Some(1.0)]),
                    series("c", 60, &[Some(1.0)]),
                ]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidArguments { .. }), "{err}");
    }

    #[test]
    fn test_group_concatenates_in_order() {
        let result = call(
            "group",
            vec![
                Argument::Series(vec![series("b", 60, &[Some(1.0)])]),
                Argument::Series(vec![series("a", 60, &[Some(2.0)])]),
            ],
        )
        .unwrap();
        let names: Vec<_> = result.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
