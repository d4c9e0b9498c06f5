//! Renaming functions.

use common::TimeSeries;
use regex::Regex;

use super::{Args, Argument, FunctionRegistry, FunctionSpec};
use crate::evaluation::EvalResult;
use crate::target::FunctionCall;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("alias", FunctionSpec::new(2, Some(2), alias));
    registry.register("aliasByNode", FunctionSpec::new(2, None, alias_by_node));
    registry.register("aliasSub", FunctionSpec::new(3, Some(3), alias_sub));
}

fn alias(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let name = args.string(1)?;
    Ok(series.into_iter().map(|s| s.renamed(name.clone())).collect())
}

/// The metric path inside a possibly function-wrapped series name, e.g.
/// `a.b.c` for `scale(sumSeries(a.b.c),2)`.
fn base_path(name: &str) -> &str {
    let inner = name.rsplit('(').next().unwrap_or(name);
    inner.split([',', ')']).next().unwrap_or(inner)
}

fn alias_by_node(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let nodes = args.integers_from(1)?;

    series
        .into_iter()
        .map(|s| {
            let parts: Vec<&str> = base_path(&s.name).split('.').collect();
            let picked = nodes
                .iter()
                .map(|&node| {
                    let index = if node < 0 { parts.len() as i64 + node } else { node };
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| parts.get(i).copied())
                        .ok_or_else(|| {
                            args.invalid(format!("node {node} is out of range for '{}'", s.name))
                        })
                })
                .collect::<EvalResult<Vec<_>>>()?;
            let name = picked.join(".");
            Ok(s.renamed(name))
        })
        .collect()
}

/// Converts `\1` style back references into the `${1}` syntax of the regex
/// crate; a literal `$` is escaped.
fn replacement_template(replacement: &str) -> String {
    let mut template = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                template.push_str("${");
                while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                    template.push(digit);
                }
                template.push('}');
            }
            '$' => template.push_str("$$"),
            c => template.push(c),
        }
    }
    template
}

fn alias_sub(call: &FunctionCall, args: Vec<Argument>) -> EvalResult<Vec<TimeSeries>> {
    let mut args = Args::new(call, args);
    let series = args.series(0)?;
    let search = args.string(1)?;
    let replacement = replacement_template(&args.string(2)?);
    let regex = Regex::new(&search)
        .map_err(|e| args.invalid(format!("invalid regex '{search}': {e}")))?;

    Ok(series
        .into_iter()
        .map(|s| {
            let name = regex.replace_all(&s.name, replacement.as_str()).into_owned();
            s.renamed(name)
        })
        .collect())
}
