//! Per-series value transforms. Each output keeps its input's window and
//! step and is named by wrapping the input name.

use common::TimeSeries;

use super::{Args, Argument, FunctionRegistry, FunctionSpec};
use crate::evaluation::EvalResult;
use crate::target::FunctionCall;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("scale", FunctionSpec::new(2, Some(2), scale));
    registry.register("offset", FunctionSpec::new(2, Some(2), offset));
    registry.register("absolute", FunctionSpec::new(1, Some(1), absolute));
    registry.register("invert", FunctionSpec::new(1, Some(1), invert));
    registry.register("log", FunctionSpec::new(1, Some(2), log));
    registry.register("derivative", FunctionSpec::new(1, Some(1), derivative));
    registry.register(
        "nonNegativeDerivative",
        FunctionSpec::new(1, Some(2), non_negative_derivative),
    );
    registry.register("perSecond", FunctionSpec::new(1, Some(2), per_second));
    registry.register("integral", FunctionSpec::new(1, Some(1), integral));
    registry.register("movingAverage", FunctionSpec::new(2, Some(2), moving_average));
    registry.register("keepLastValue", FunctionSpec::new(1, Some(2), keep_last_value));
    registry.register("transformNull", FunctionSpec::new(1, Some(2), transform_null));
}

/// Applies `f` to every present value; absent values stay absent.
fn map_values(
    series: Vec<TimeSeries>,
    name: impl Fn(&TimeSeries) -> String,
    f: impl Fn(f64) -> Option<f64>,
) -> Vec<TimeSeries> {
    series
        .iter()
        .map(|s| s.with_values(name(s), s.values.iter().map(|v| v.and_then(&f)).collect()))
        .collect()
}

/// Rewrites the whole value vector of every series.
fn map_series(
    series: Vec<TimeSeries>,
    name: impl Fn(&TimeSeries) -> String,
    f: impl Fn(&TimeSeries) -> Vec<Option<f64>>,
) -> Vec<TimeSeries> {
    series.iter().map(|s| s.with_values(name(s), f(s))).collect()
}

fn scale(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let factor = args.number(1)?;
    Ok(map_values(
        series,
        |s| format!("scale({},{factor})", s.name),
        |v| Some(v * factor),
    ))
}

fn offset(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let amount = args.number(1)?;
    Ok(map_values(
        series,
        |s| format!("offset({},{amount})", s.name),
        |v| Some(v + amount),
    ))
}

fn absolute(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series(0)?;
    Ok(map_values(
        series,
        |s| format!("absolute({})", s.name),
        |v| Some(v.abs()),
    ))
}

fn invert(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series(0)?;
    Ok(map_values(
        series,
        |s| format!("invert({})", s.name),
        |v| (v != 0.0).then(|| 1.0 / v),
    ))
}

fn log(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let base = args.opt_number(1)?.unwrap_or(10.0);
    if base <= 0.0 || base == 1.0 {
        return Err(args.precondition(format!("base must be positive and not 1, got {base}")));
    }
    Ok(map_values(
        series,
        |s| format!("log({},{base})", s.name),
        |v| (v > 0.0).then(|| v.log(base)),
    ))
}

fn derivative(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series(0)?;
    Ok(map_series(
        series,
        |s| format!("derivative({})", s.name),
        |s| {
            let mut previous = None;
            s.values
                .iter()
                .map(|&value| {
                    let delta = match (previous, value) {
                        (Some(p), Some(v)) => Some(v - p),
                        _ => None,
                    };
                    previous = value;
                    delta
                })
                .collect()
        },
    ))
}

/// Delta to the previous point. A decrease is treated as a counter wrap at
/// `max_value` when one is given and the new value fits under it, and as a
/// reset (absent) otherwise.
fn non_negative_deltas(values: &[Option<f64>], max_value: Option<f64>) -> Vec<Option<f64>> {
    let mut previous = None;
    values
        .iter()
        .map(|&value| {
            let delta = match (previous, value) {
                (Some(p), Some(v)) if v >= p => Some(v - p),
                (Some(p), Some(v)) => match max_value {
                    Some(max) if max >= v => Some(max - p + v + 1.0),
                    _ => None,
                },
                _ => None,
            };
            previous = value;
            delta
        })
        .collect()
}

fn non_negative_derivative(
    call: &FunctionCall,
    args: Vec<Argument>,
) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let max_value = args.opt_number(1)?;
    Ok(map_series(
        series,
        |s| format!("nonNegativeDerivative({})", s.name),
        |s| non_negative_deltas(&s.values, max_value),
    ))
}

fn per_second(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let max_value = args.opt_number(1)?;
    Ok(map_series(
        series,
        |s| format!("perSecond({})", s.name),
        |s| {
            let step = s.step as f64;
            non_negative_deltas(&s.values, max_value)
                .into_iter()
                .map(|delta| delta.map(|d| d / step))
                .collect()
        },
    ))
}

fn integral(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let series = Args::new(call, args).series(0)?;
    Ok(map_series(
        series,
        |s| format!("integral({})", s.name),
        |s| {
            let mut total = 0.0;
            s.values
                .iter()
                .map(|value| {
                    value.map(|v| {
                        total += v;
                        total
                    })
                })
                .collect()
        },
    ))
}

/// Average of the present values among the last `window` points, the
/// current one included.
fn moving_average(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let window = args.count(1)?;
    if window == 0 {
        return Err(args.invalid("windowPoints must be at least 1"));
    }
    Ok(map_series(
        series,
        |s| format!("movingAverage({},{window})", s.name),
        |s| {
            (0..s.values.len())
                .map(|i| {
                    let start = (i + 1).saturating_sub(window);
                    let present: Vec<f64> = s.values[start..=i].iter().filter_map(|v| *v).collect();
                    (!present.is_empty())
                        .then(|| present.iter().sum::<f64>() / present.len() as f64)
                })
                .collect()
        },
    ))
}

/// Repeats the last present value over gaps of at most `limit` points,
/// including a trailing gap. Leading gaps stay absent.
fn fill_gaps(values: &[Option<f64>], limit: usize) -> Vec<Option<f64>> {
    let mut filled = values.to_vec();
    let mut last = None;
    let mut gap_start = None;
    for i in 0..values.len() {
        match values[i] {
            Some(value) => {
                if let (Some(start), Some(fill)) = (gap_start.take(), last) {
                    if i - start <= limit {
                        filled[start..i].fill(Some(fill));
                    }
                }
                last = Some(value);
            }
            None => {
                if gap_start.is_none() {
                    gap_start = Some(i);
                }
            }
        }
    }
    if let (Some(start), Some(fill)) = (gap_start, last) {
        if values.len() - start <= limit {
            filled[start..].fill(Some(fill));
        }
    }
    filled
}

fn keep_last_value(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let limit = args.opt_count(1)?.unwrap_or(usize::MAX);
    Ok(map_series(
        series,
        |s| format!("keepLastValue({})", s.name),
        |s| fill_gaps(&s.values, limit),
    ))
}

fn transform_null(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let default = args.opt_number(1)?.unwrap_or(0.0);
    Ok(map_series(
        series,
        |s| format!("transformNull({},{default})", s.name),
        |s| s.values.iter().map(|v| Some(v.unwrap_or(default))).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, series, values};
    use super::*;
    use crate::evaluation::EvaluationError;

    fn input(values: &[Option<f64>]) -> Argument {
        Argument::Series(vec![series("m", 60, values)])
    }

    #[test]
    fn test_scale_and_offset() {
        let result = call("scale", vec![input(&[Some(1.5), None]), Argument::Number(2.0)]);
        assert_eq!(values(&result), vec![vec![Some(3.0), None]]);
        assert_eq!(result.unwrap()[0].name, "scale(m,2)");

        let result = call("offset", vec![input(&[Some(1.0), None]), Argument::Number(-0.5)]);
        assert_eq!(values(&result), vec![vec![Some(0.5), None]]);
        assert_eq!(result.unwrap()[0].name, "offset(m,-0.5)");
    }

    #[test]
    fn test_scale_applies_to_every_series() {
        let result = call(
            "scale",
            vec![
                Argument::Series(vec![
                    series("a", 60, &[Some(1.0)]),
                    series("b", 60, &[Some(2.0)]),
                ]),
                Argument::Number(10.0),
            ],
        );
        assert_eq!(values(&result), vec![vec![Some(10.0)], vec![Some(20.0)]]);
    }

    #[test]
    fn test_scale_rejects_non_numeric_factor() {
        let err = call(
            "scale",
            vec![input(&[Some(1.0)]), Argument::String("x".to_string())],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidArguments { .. }));
    }

    #[test]
    fn test_absolute_and_invert() {
        assert_eq!(
            values(&call("absolute", vec![input(&[Some(-2.0), None, Some(3.0)])])),
            vec![vec![Some(2.0), None, Some(3.0)]]
        );
        assert_eq!(
            values(&call("invert", vec![input(&[Some(4.0), Some(0.0), None])])),
            vec![vec![Some(0.25), None, None]]
        );
    }

    #[test]
    fn test_log() {
        let close = |actual: Option<f64>, expected: f64| {
            actual.is_some_and(|v| (v - expected).abs() < 1e-12)
        };
        let result = values(&call(
            "log",
            vec![input(&[Some(100.0), Some(0.0), Some(-1.0), None])],
        ));
        assert!(close(result[0][0], 2.0));
        assert_eq!(result[0][1..], [None, None, None]);

        let result = values(&call("log", vec![input(&[Some(8.0)]), Argument::Number(2.0)]));
        assert!(close(result[0][0], 3.0));
        assert!(matches!(
            call("log", vec![input(&[Some(8.0)]), Argument::Number(1.0)]),
            Err(EvaluationError::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn test_derivative_needs_both_points() {
        assert_eq!(
            values(&call("derivative", vec![input(&[Some(1.0), Some(4.0), None, Some(2.0), Some(1.0)])])),
            vec![vec![None, Some(3.0), None, None, Some(-1.0)]]
        );
    }

    #[test]
    fn test_non_negative_derivative() {
        let counter = &[Some(1.0), Some(5.0), Some(2.0), Some(4.0)];
        assert_eq!(
            values(&call("nonNegativeDerivative", vec![input(counter)])),
            vec![vec![None, Some(4.0), None, Some(2.0)]]
        );
        assert_eq!(
            values(&call("nonNegativeDerivative", vec![input(counter), Argument::Number(9.0)])),
            vec![vec![None, Some(4.0), Some(7.0), Some(2.0)]]
        );
    }

    #[test]
    fn test_per_second_divides_by_step() {
        assert_eq!(
            values(&call("perSecond", vec![input(&[Some(0.0), Some(120.0), Some(60.0)])])),
            vec![vec![None, Some(2.0), None]]
        );
    }

    #[test]
    fn test_integral_skips_absent_values() {
        assert_eq!(
            values(&call("integral", vec![input(&[Some(1.0), None, Some(2.0), Some(3.0)])])),
            vec![vec![Some(1.0), None, Some(3.0), Some(6.0)]]
        );
    }

    #[test]
    fn test_moving_average() {
        let result = call(
            "movingAverage",
            vec![input(&[Some(1.0), Some(3.0), None, Some(5.0)]), Argument::Number(2.0)],
        );
        assert_eq!(
            values(&result),
            vec![vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)]]
        );
        assert_eq!(result.unwrap()[0].name, "movingAverage(m,2)");

        assert!(call("movingAverage", vec![input(&[Some(1.0)]), Argument::Number(0.0)]).is_err());
        assert!(call("movingAverage", vec![input(&[Some(1.0)]), Argument::Number(1.5)]).is_err());
    }

    #[test]
    fn test_keep_last_value() {
        let gappy = &[None, Some(1.0), None, None, Some(2.0), None, None, None];
        assert_eq!(
            values(&call("keepLastValue", vec![input(gappy)])),
            vec![vec![None, Some(1.0), Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(2.0)]]
        );
        assert_eq!(
            values(&call("keepLastValue", vec![input(gappy), Argument::Number(2.0)])),
            vec![vec![None, Some(1.0), Some(1.0), Some(1.0), Some(2.0), None, None, None]]
        );
    }

    #[test]
    fn test_transform_null() {
        assert_eq!(
            values(&call("transformNull", vec![input(&[None, Some(1.0)])])),
            vec![vec![Some(0.0), Some(1.0)]]
        );
        assert_eq!(
            values(&call("transformNull", vec![input(&[None]), Argument::Number(-1.0)])),
            vec![vec![Some(-1.0)]]
        );
    }
}
