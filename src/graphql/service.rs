//! HTTP routes for `/graphql`.

use async_graphql::dynamic::Schema;
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::registry::RequestContext;

/// Header carrying the caller's user id, forwarded to hooks.
pub const USER_ID_HEADER: &str = "x-user-id";

/// `GET /graphql` serves GraphiQL, `POST /graphql` executes requests.
pub fn router(schema: Schema) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .with_state(schema)
}

/// Build the per-request hook context from headers.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let mut ctx = RequestContext::new();
    if let Some(user_id) = headers
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
    {
        ctx = ctx.with_user(user_id);
    }
    ctx
}

async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if accepts_html {
        axum::response::Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
    } else {
        (
            axum::http::StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(serde_json::json!({
                "error": "GET requests are not supported for GraphQL queries. Use POST with Content-Type: application/json"
            })),
        )
            .into_response()
    }
}

async fn graphql_handler(
    State(schema): State<Schema>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let ctx = request_context(&headers);
    match &ctx.user_id {
        Some(user_id) => tracing::debug!(user_id = %user_id, "GraphQL request"),
        None => tracing::debug!("Anonymous GraphQL request"),
    }
    schema.execute(req.into_inner().data(ctx)).await.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_context_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(request_context(&headers).user_id.is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" u-42 "));
        assert_eq!(request_context(&headers).user_id.as_deref(), Some("u-42"));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(""));
        assert!(request_context(&headers).user_id.is_none());
    }
}
