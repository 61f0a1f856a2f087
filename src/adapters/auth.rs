//! Static API-key authentication for the protected routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::config::AuthSettings;

pub type SharedAuthSettings = Arc<AuthSettings>;

pub async fn auth_middleware(
    State(auth): State<SharedAuthSettings>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(auth.header_name.as_str())
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if auth.api_keys.iter().any(|k| k == key) => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or missing API key" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::HeaderValue;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::util::ServiceExt;

    fn protected_app(auth: AuthSettings) -> Router {
        Router::new()
            .route("/secret", get(|| async { "ok" }))
            .layer(from_fn_with_state(Arc::new(auth), auth_middleware))
    }

    #[tokio::test]
    async fn rejects_missing_key() {
        let app = protected_app(AuthSettings {
            enabled: true,
            api_keys: vec!["k1".into()],
            header_name: "x-api-key".into(),
        });

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_valid_key() {
        let app = protected_app(AuthSettings {
            enabled: true,
            api_keys: vec!["k1".into()],
            header_name: "x-api-key".into(),
        });

        let mut request = axum::http::Request::builder()
            .uri("/secret")
            .body(Body::empty())
            .unwrap();
        request
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("k1"));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
