use axum::{
    extract::{RawQuery, State},
    http::{Method, header},
    response::{IntoResponse, Response},
};

use crate::RouterState;
use crate::error::ApiError;
use crate::params::{RequestParams, render_parameters};

/// GET|POST /render
///
/// Evaluates the `target` expressions over the requested window. POST takes
/// the same parameters form-encoded in the body.
#[tracing::instrument(skip_all, fields(method = %method))]
pub async fn render<S: RouterState>(
    State(state): State<S>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, ApiError> {
    let body = (method == Method::POST).then_some(body.as_str());
    let params = RequestParams::decode(query.as_deref(), body);
    let parameters = render_parameters(&params, chrono::Utc::now().timestamp())?;

    let rendered = state.render_service().render(parameters).await?;
    Ok(([(header::CONTENT_TYPE, rendered.content_type)], rendered.body).into_response())
}
