use axum::{
    extract::{RawQuery, State},
    http::{Method, header},
    response::{IntoResponse, Response},
};

use crate::RouterState;
use crate::error::ApiError;
use crate::params::{RequestParams, search_parameters};

/// GET|POST /paths
///
/// Newline-delimited metric paths matching `query`, at most `search.limit`
/// of them.
#[tracing::instrument(skip_all, fields(method = %method))]
pub async fn paths<S: RouterState>(
    State(state): State<S>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Response, ApiError> {
    if method != Method::GET && method != Method::POST {
        return Err(ApiError::UnsupportedMethod(method));
    }
    let body = (method == Method::POST).then_some(body.as_str());
    let params = RequestParams::decode(query.as_deref(), body);
    let search = search_parameters(&params)?;

    state.stats().inc_paths_requests(&search.tenant);
    let limit = state.config().search.limit;
    let paths = state
        .index()
        .search_paths(&search.tenant, &search.query, limit)
        .await?;
    tracing::debug!(tenant = %search.tenant, found = paths.len(), "Path search completed");

    Ok(([(header::CONTENT_TYPE, "text/plain")], paths.join("\n")).into_response())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{body_text, get, post_form, state_with_index, test_app};
    use crate::create_router;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::testing::MockMetricIndex;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_paths_get() {
        let (app, stats) = test_app(Duration::from_secs(5));
        let response = get(app, "/paths?query=metric.*&tenant=acme").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(body_text(response).await, "metric.a\nmetric.b");
        assert_eq!(stats.tenant("acme").paths_requests, 1);
    }

    #[tokio::test]
    async fn test_paths_post_joins_queries() {
        let (app, _) = test_app(Duration::from_secs(5));
        let response = post_form(app, "/paths", "query=metric.a&query=metric.b&tenant=acme").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "metric.a\nmetric.b");
    }

    #[tokio::test]
    async fn test_paths_default_tenant_is_isolated() {
        let (app, stats) = test_app(Duration::from_secs(5));
        let response = get(app, "/paths?query=metric.*").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
        assert_eq!(stats.tenant("NONE").paths_requests, 1);
    }

    #[tokio::test]
    async fn test_missing_query_never_reaches_the_index() {
        let mut index = MockMetricIndex::new();
        index.expect_search_paths().never();
        let (state, stats) = state_with_index(Arc::new(index), Duration::from_secs(5));

        let response = get(create_router(state), "/paths?tenant=acme").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Missing required parameter 'query'"));
        assert_eq!(stats.tenant("acme").paths_requests, 0);
    }

    #[tokio::test]
    async fn test_search_limit_is_passed_to_the_index() {
        let mut index = MockMetricIndex::new();
        index
            .expect_search_paths()
            .withf(|tenant, query, limit| tenant == "acme" && query == "a|b" && *limit == 100)
            .times(1)
            .returning(|_, _, _| Ok(vec!["a.x".to_string()]));
        let (state, _) = state_with_index(Arc::new(index), Duration::from_secs(5));

        let response = get(create_router(state), "/paths?tenant=acme&query=a&query=b").await;
        assert_eq!(body_text(response).await, "a.x");
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected() {
        let (app, _) = test_app(Duration::from_secs(5));
        let request = Request::builder()
            .method("DELETE")
            .uri("/paths?query=metric.*")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Unsupported method DELETE"));
    }
}
