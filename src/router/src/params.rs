//! Request parameter decoding shared by the render and search endpoints.
//!
//! Parameters come from the query string and, for POST, from a
//! form-encoded body; repeated keys keep every value in order.

use chrono::{NaiveDate, NaiveDateTime};
use common::parse_interval;
use querier::{OutputFormat, RenderParameters};

use crate::error::ApiError;

pub const DEFAULT_TENANT: &str = "NONE";
const DEFAULT_FROM: &str = "-1d";
const DEFAULT_UNTIL: &str = "now";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Decodes the query string and an optional form-encoded body.
    pub fn decode(query: Option<&str>, body: Option<&str>) -> Self {
        let pairs = query
            .into_iter()
            .chain(body)
            .flat_map(|encoded| url::form_urlencoded::parse(encoded.as_bytes()).into_owned())
            .collect();
        Self { pairs }
    }

    /// First non-empty value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.all(key).into_iter().next()
    }

    /// Every non-empty value of `key`, in request order.
    pub fn all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn tenant(&self) -> String {
        self.first("tenant").unwrap_or(DEFAULT_TENANT).to_string()
    }
}

/// Parses a render time: unix seconds, `now`, a relative offset such as
/// `-5min`, `HH:MM_YYYYMMDD` or `YYYYMMDD`. Dates are UTC.
pub fn parse_time(text: &str, now: i64) -> Result<i64, String> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if text.starts_with(['-', '+']) {
        return parse_interval(text)
            .and_then(|offset| now.checked_add(offset))
            .ok_or_else(|| format!("invalid relative time '{text}'"));
    }
    if text.contains('_') {
        return NaiveDateTime::parse_from_str(text, "%H:%M_%Y%m%d")
            .map(|dt| dt.and_utc().timestamp())
            .map_err(|e| format!("invalid time '{text}': {e}"));
    }
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(midnight.and_utc().timestamp());
        }
    }
    text.parse::<i64>()
        .map_err(|_| format!("unrecognized time '{text}'"))
}

fn time_param(params: &RequestParams, key: &str, default: &str, now: i64) -> Result<i64, ApiError> {
    let text = params.first(key).unwrap_or(default);
    parse_time(text, now).map_err(|reason| ApiError::InvalidParameter(format!("{key}: {reason}")))
}

/// Builds render parameters; `now` anchors relative times.
pub fn render_parameters(params: &RequestParams, now: i64) -> Result<RenderParameters, ApiError> {
    let targets: Vec<String> = params.all("target").into_iter().map(str::to_string).collect();
    if targets.is_empty() {
        return Err(ApiError::MissingParameter("target"));
    }

    let format = match params.first("format") {
        Some(text) => text.parse::<OutputFormat>().map_err(ApiError::InvalidParameter)?,
        None => OutputFormat::default(),
    };
    let human_readable = match params.first("valueFormat") {
        None => false,
        Some(text) if text.eq_ignore_ascii_case("machine") => false,
        Some(text) if text.eq_ignore_ascii_case("human") => true,
        Some(other) => {
            return Err(ApiError::InvalidParameter(format!(
                "valueFormat must be 'human' or 'machine', got '{other}'"
            )));
        }
    };
    let log_base = params
        .first("logBase")
        .map(|text| {
            text.parse::<f64>()
                .map_err(|_| ApiError::InvalidParameter(format!("logBase: invalid number '{text}'")))
        })
        .transpose()?;

    Ok(RenderParameters {
        tenant: params.tenant(),
        targets,
        from: time_param(params, "from", DEFAULT_FROM, now)?,
        until: time_param(params, "until", DEFAULT_UNTIL, now)?,
        format,
        human_readable,
        log_base,
    })
}

/// Validated inputs of one path search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameters {
    pub tenant: String,
    /// Alternatives joined with `|`
    pub query: String,
}

pub fn search_parameters(params: &RequestParams) -> Result<SearchParameters, ApiError> {
    let queries = params.all("query");
    if queries.is_empty() {
        return Err(ApiError::MissingParameter("query"));
    }
    Ok(SearchParameters {
        tenant: params.tenant(),
        query: queries.join("|"),
    })
}
