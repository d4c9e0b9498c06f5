//! Core time-series data model shared by the storage collaborators and the
//! query engine.

use serde::{Deserialize, Serialize};

/// Number of samples a series covering `[from, until)` at `step` must hold.
///
/// Returns zero for empty or inverted windows and for non-positive steps.
/// Computed in `i128`, so any pair of `i64` bounds is accepted; counts beyond
/// `usize::MAX` saturate.
pub fn expected_len(from: i64, until: i64, step: i64) -> usize {
    if step <= 0 || until <= from {
        return 0;
    }
    let span = i128::from(until) - i128::from(from);
    let step = i128::from(step);
    usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
}

/// A single named series of optional samples on a fixed step.
///
/// Value `i` is stamped `from + i * step`. `None` means "no data", which is
/// distinct from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    pub tenant: String,
    pub from: i64,
    pub until: i64,
    pub step: i64,
    pub values: Vec<Option<f64>>,
}

impl TimeSeries {
    /// Builds a series, padding with `None` or dropping trailing values so the
    /// window invariant holds.
    ///
    /// Callers that could lose data through the drop branch must resample
    /// first; this is only a guard against off-by-one windows.
    pub fn new(
        name: impl Into<String>,
        tenant: impl Into<String>,
        from: i64,
        until: i64,
        step: i64,
        mut values: Vec<Option<f64>>,
    ) -> Self {
        let len = expected_len(from, until, step);
        if values.len() != len {
            log::trace!(
                "Adjusting series length from {} to {} (from={}, until={}, step={})",
                values.len(),
                len,
                from,
                until,
                step
            );
            values.resize(len, None);
        }
        Self {
            name: name.into(),
            tenant: tenant.into(),
            from,
            until,
            step,
            values,
        }
    }

    /// A series with no data over the whole window.
    pub fn empty(
        name: impl Into<String>,
        tenant: impl Into<String>,
        from: i64,
        until: i64,
        step: i64,
    ) -> Self {
        Self::new(name, tenant, from, until, step, Vec::new())
    }

    /// Copy of this series with new values on the same window and step.
    pub fn with_values(&self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(
            name,
            self.tenant.clone(),
            self.from,
            self.until,
            self.step,
            values,
        )
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Timestamp of the sample at `index`.
    pub fn timestamp_at(&self, index: usize) -> i64 {
        self.from + index as i64 * self.step
    }

    /// `(timestamp, value)` pairs in order.
    pub fn points(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.timestamp_at(i), *v))
    }

    /// Present values only, in order.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(|v| *v)
    }

    pub fn is_well_formed(&self) -> bool {
        self.step > 0 && self.values.len() == expected_len(self.from, self.until, self.step)
    }

    /// Consolidates onto a coarser step that is a multiple of the current one,
    /// averaging the present values of each bucket.
    ///
    /// Returns `None` when `step` is not a positive multiple of `self.step`.
    pub fn consolidate(&self, step: i64) -> Option<Self> {
        if step == self.step {
            return Some(self.clone());
        }
        if step <= 0 || step % self.step != 0 {
            return None;
        }
        let factor = (step / self.step) as usize;
        let len = expected_len(self.from, self.until, step);
        let values = (0..len)
            .map(|bucket| {
                let start = bucket * factor;
                let end = (start + factor).min(self.values.len());
                let present: Vec<f64> = self.values[start.min(end)..end]
                    .iter()
                    .filter_map(|v| *v)
                    .collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            })
            .collect();
        Some(Self::new(
            self.name.clone(),
            self.tenant.clone(),
            self.from,
            self.until,
            step,
            values,
        ))
    }
}

/// Parses a duration such as `30s`, `5min`, `2h`, `-1d`, `1w`, `1mon` or `1y`
/// into signed seconds. A month is 30 days and a year 365 days.
pub fn parse_interval(text: &str) -> Option<i64> {
    let text = text.trim();
    let (sign, rest) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (count, unit) = rest.split_at(split);
    let count: i64 = count.parse().ok()?;
    let unit_secs = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 7 * 86_400,
        "mon" | "month" | "months" => 30 * 86_400,
        "y" | "year" | "years" => 365 * 86_400,
        _ => return None,
    };
    count.checked_mul(unit_secs).map(|secs| secs * sign)
}
