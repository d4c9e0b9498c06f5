//! Function library.
//!
//! Functions are plain `fn` items registered by name. Each receives the call
//! it was invoked from (for naming and error reporting) and its already
//! evaluated arguments, and returns the series it produces.

mod alias;
mod combine;
mod filter;
mod summarize;
mod transform;

use std::collections::HashMap;

use common::TimeSeries;

use crate::evaluation::{EvalResult, EvaluationError};
use crate::target::FunctionCall;

/// An evaluated function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Series(Vec<TimeSeries>),
    Number(f64),
    String(String),
    Bool(bool),
}

impl Argument {
    fn kind(&self) -> &'static str {
        match self {
            Argument::Series(_) => "series list",
            Argument::Number(_) => "number",
            Argument::String(_) => "string",
            Argument::Bool(_) => "boolean",
        }
    }
}

pub type FunctionImpl = fn(&FunctionCall, Vec<Argument>) -> EvalResult<Vec<TimeSeries>>;

#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub apply: FunctionImpl,
}

impl FunctionSpec {
    pub const fn new(min_args: usize, max_args: Option<usize>, apply: FunctionImpl) -> Self {
        Self {
            min_args,
            max_args,
            apply,
        }
    }

    pub fn check_arity(&self, count: usize) -> Result<(), String> {
        if count < self.min_args {
            return Err(format!(
                "expects at least {} argument(s), got {count}",
                self.min_args
            ));
        }
        match self.max_args {
            Some(max) if count > max => Err(format!(
                "expects at most {max} argument(s), got {count}"
            )),
            _ => Ok(()),
        }
    }
}

/// Name to implementation map, built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in function.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        combine::register(&mut registry);
        transform::register(&mut registry);
        summarize::register(&mut registry);
        alias::register(&mut registry);
        filter::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, spec: FunctionSpec) {
        self.functions.insert(name.to_string(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Positional access to evaluated arguments with typed extraction.
///
/// Each argument can be taken once.
pub(crate) struct Args<'a> {
    call: &'a FunctionCall,
    values: Vec<Option<Argument>>,
}

impl<'a> Args<'a> {
    pub(crate) fn new(call: &'a FunctionCall, args: Vec<Argument>) -> Self {
        Self {
            call,
            values: args.into_iter().map(Some).collect(),
        }
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> EvaluationError {
        EvaluationError::InvalidArguments {
            function: self.call.name.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn precondition(&self, reason: impl Into<String>) -> EvaluationError {
        EvaluationError::PreconditionFailed {
            function: self.call.name.clone(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, index: usize) -> Option<Argument> {
        self.values.get_mut(index).and_then(Option::take)
    }

    fn mismatch(&self, index: usize, expected: &str, found: &Argument) -> EvaluationError {
        self.invalid(format!(
            "argument {} must be a {expected}, got a {}",
            index + 1,
            found.kind()
        ))
    }

    pub(crate) fn series(&mut self, index: usize) -> EvalResult<Vec<TimeSeries>> {
        match self.take(index) {
            Some(Argument::Series(series)) => Ok(series),
            Some(other) => Err(self.mismatch(index, "series list", &other)),
            None => Err(self.invalid(format!("missing argument {}", index + 1))),
        }
    }

    /// Concatenation of every series argument from `start` on.
    pub(crate) fn series_from(&mut self, start: usize) -> EvalResult<Vec<TimeSeries>> {
        let mut all = Vec::new();
        for index in start..self.values.len() {
            all.extend(self.series(index)?);
        }
        Ok(all)
    }

    pub(crate) fn opt_number(&mut self, index: usize) -> EvalResult<Option<f64>> {
        match self.take(index) {
            None => Ok(None),
            Some(Argument::Number(value)) => Ok(Some(value)),
            Some(other) => Err(self.mismatch(index, "number", &other)),
        }
    }

    pub(crate) fn number(&mut self, index: usize) -> EvalResult<f64> {
        self.opt_number(index)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", index + 1)))
    }

    /// A non-negative whole number.
    pub(crate) fn opt_count(&mut self, index: usize) -> EvalResult<Option<usize>> {
        match self.opt_number(index)? {
            None => Ok(None),
            Some(value) if value >= 0.0 && value.fract() == 0.0 => Ok(Some(value as usize)),
            Some(value) => Err(self.invalid(format!(
                "argument {} must be a non-negative integer, got {value}",
                index + 1
            ))),
        }
    }

    pub(crate) fn count(&mut self, index: usize) -> EvalResult<usize> {
        self.opt_count(index)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", index + 1)))
    }

    pub(crate) fn opt_string(&mut self, index: usize) -> EvalResult<Option<String>> {
        match self.take(index) {
            None => Ok(None),
            Some(Argument::String(value)) => Ok(Some(value)),
            Some(other) => Err(self.mismatch(index, "string", &other)),
        }
    }

    pub(crate) fn string(&mut self, index: usize) -> EvalResult<String> {
        self.opt_string(index)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", index + 1)))
    }

    pub(crate) fn opt_bool(&mut self, index: usize) -> EvalResult<Option<bool>> {
        match self.take(index) {
            None => Ok(None),
            Some(Argument::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(self.mismatch(index, "boolean", &other)),
        }
    }

    /// Whole numbers from `start` on; negative values are allowed.
    pub(crate) fn integers_from(&mut self, start: usize) -> EvalResult<Vec<i64>> {
        let mut integers = Vec::new();
        for index in start..self.values.len() {
            let value = self.number(index)?;
            if value.fract() != 0.0 {
                return Err(self.invalid(format!(
                    "argument {} must be an integer, got {value}",
                    index + 1
                )));
            }
            integers.push(value as i64);
        }
        Ok(integers)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: i64, b: i64) -> i64 {
    a / gcd(a, b) * b
}

/// Consolidates `series` onto the least common multiple of their steps.
///
/// All inputs must cover the same window.
pub(crate) fn align(series: Vec<TimeSeries>, function: &str) -> EvalResult<Vec<TimeSeries>> {
    let precondition = |reason: String| EvaluationError::PreconditionFailed {
        function: function.to_string(),
        reason,
    };
    let Some(first) = series.first() else {
        return Ok(series);
    };
    let (from, until) = (first.from, first.until);
    if let Some(other) = series.iter().find(|s| s.from != from || s.until != until) {
        return Err(precondition(format!(
            "series '{}' covers [{}, {}) instead of [{from}, {until})",
            other.name, other.from, other.until
        )));
    }

    let step = series.iter().map(|s| s.step).fold(1, lcm);
    if series.iter().all(|s| s.step == step) {
        return Ok(series);
    }
    series
        .iter()
        .map(|s| {
            s.consolidate(step)
                .ok_or_else(|| precondition(format!("cannot consolidate '{}' to step {step}", s.name)))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::target::{Literal, SeriesSelector, Target};

    pub fn series(name: &str, step: i64, values: &[Option<f64>]) -> TimeSeries {
        let until = values.len() as i64 * step;
        TimeSeries::new(name, "acme", 0, until, step, values.to_vec())
    }

    fn to_target(arg: &Argument) -> Target {
        match arg {
            Argument::Series(series) => Target::SeriesSelector(SeriesSelector {
                path_pattern: series
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                tenant: "acme".to_string(),
                from: 0,
                until: 0,
            }),
            Argument::Number(value) => Target::Literal(Literal::Number(*value)),
            Argument::String(value) => Target::Literal(Literal::String(value.clone())),
            Argument::Bool(value) => Target::Literal(Literal::Bool(*value)),
        }
    }

    /// Applies a registered built-in as the evaluator would.
    pub fn call(name: &str, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
        let registry = FunctionRegistry::builtin();
        let spec = registry.get(name).copied().expect("function is registered");
        let call = FunctionCall {
            name: name.to_string(),
            args: args.iter().map(to_target).collect(),
        };
        spec.check_arity(args.len())
            .map_err(|reason| EvaluationError::InvalidArguments {
                function: name.to_string(),
                reason,
            })?;
        let result = (spec.apply)(&call, args)?;
        assert!(result.iter().all(TimeSeries::is_well_formed));
        Ok(result)
    }

    pub fn values(result: &EvalResult<Vec<TimeSeries>>) -> Vec<Vec<Option<f64>>> {
        result
            .as_ref()
            .expect("function succeeded")
            .iter()
            .map(|s| s.values.clone())
            .collect()
    }
}
