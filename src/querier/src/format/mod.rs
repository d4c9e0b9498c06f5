//! Response formatting of evaluated series.

mod value_formatter;

use std::borrow::Cow;
use std::str::FromStr;

use chrono::DateTime;
use common::TimeSeries;
use serde::Serialize;

pub use value_formatter::ValueFormatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Raw,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Csv => "text/csv",
            OutputFormat::Raw => "text/plain",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "raw" => Ok(OutputFormat::Raw),
            other => Err(format!("unsupported format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    /// Render `log_base(v)` instead of `v`
    pub log_base: Option<f64>,
}

/// A formatted response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Scale incompatibility: {0}")]
    ScaleIncompatibility(String),

    #[error("Failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Formats `series` in the requested output format.
pub fn format_series(
    series: &[TimeSeries],
    options: &RenderOptions,
    formatter: ValueFormatter,
) -> Result<Rendered, FormatError> {
    let series: Cow<'_, [TimeSeries]> = match options.log_base {
        Some(base) => Cow::Owned(log_scale(series, base, formatter)?),
        None => Cow::Borrowed(series),
    };
    let body = match options.format {
        OutputFormat::Json => json(&series, formatter)?,
        OutputFormat::Csv => csv(&series, formatter),
        OutputFormat::Raw => raw(&series, formatter),
    };
    Ok(Rendered {
        content_type: options.format.content_type(),
        body,
    })
}

fn log_scale(
    series: &[TimeSeries],
    base: f64,
    formatter: ValueFormatter,
) -> Result<Vec<TimeSeries>, FormatError> {
    if formatter.is_human() {
        return Err(FormatError::ScaleIncompatibility(
            "a logarithmic scale cannot be combined with human-readable values".to_string(),
        ));
    }
    if base <= 1.0 {
        return Err(FormatError::ScaleIncompatibility(format!(
            "logarithm base must be greater than 1, got {base}"
        )));
    }
    series
        .iter()
        .map(|s| {
            if let Some((ts, v)) = s
                .points()
                .find_map(|(ts, v)| v.filter(|v| *v <= 0.0).map(|v| (ts, v)))
            {
                return Err(FormatError::ScaleIncompatibility(format!(
                    "series '{}' has non-positive value {v} at {ts}",
                    s.name
                )));
            }
            let values = s.values.iter().map(|v| v.map(|v| v.log(base))).collect();
            Ok(s.with_values(s.name.clone(), values))
        })
        .collect()
}

#[derive(Serialize)]
struct JsonSeries<'a> {
    target: &'a str,
    datapoints: Vec<(serde_json::Value, i64)>,
}

fn json(series: &[TimeSeries], formatter: ValueFormatter) -> Result<String, FormatError> {
    let body: Vec<JsonSeries<'_>> = series
        .iter()
        .map(|s| JsonSeries {
            target: &s.name,
            datapoints: s
                .points()
                .map(|(ts, value)| {
                    let value = match value {
                        None => serde_json::Value::Null,
                        Some(v) if formatter.is_human() => serde_json::Value::String(formatter.format(v)),
                        Some(v) => serde_json::Value::from(v),
                    };
                    (value, ts)
                })
                .collect(),
        })
        .collect();
    Ok(serde_json::to_string(&body)?)
}

fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

fn csv(series: &[TimeSeries], formatter: ValueFormatter) -> String {
    let mut out = String::new();
    for s in series {
        let name = csv_field(&s.name);
        for (ts, value) in s.points() {
            let stamp = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| ts.to_string());
            let value = value.map(|v| formatter.format(v)).unwrap_or_default();
            out.push_str(&format!("{name},{stamp},{value}\n"));
        }
    }
    out
}

fn raw(series: &[TimeSeries], formatter: ValueFormatter) -> String {
    let mut out = String::new();
    for s in series {
        let values: Vec<String> = s
            .values
            .iter()
            .map(|v| v.map_or_else(|| "None".to_string(), |v| formatter.format(v)))
            .collect();
        out.push_str(&format!(
            "{},{},{},{}|{}\n",
            s.name,
            s.from,
            s.until,
            s.step,
            values.join(",")
        ));
    }
    out
}
