//! HTTP Handlers
//!
//! Network listing and client address checks.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ipnets_core::QueryService;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Header carrying the client address, set by the fronting proxy
const X_REAL_IP: &str = "x-real-ip";

const INVALID_ADDRESS_MESSAGE: &str = "X-Real-IP header is not provided or malformed";

/// Application state shared across handlers
pub struct AppState {
    pub query: QueryService,
}

/// Check response
#[derive(Serialize)]
pub struct RealIpResponse {
    pub real_ip: String,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_handler))
        .route("/check", get(check_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - JSON array of the installed networks
pub async fn list_handler(State(state): State<Arc<AppState>>) -> Response {
    json_response(StatusCode::OK, &state.query.snapshot())
}

/// GET /check - Test the X-Real-IP address against the networks
///
/// 503 when the address is inside a known network, 200 otherwise,
/// 400 when the header is missing or unparsable.
pub async fn check_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let raw = headers
        .get(X_REAL_IP)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match state.query.check_address(raw) {
        Ok(check) => {
            let status = if check.matched {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            json_response(
                status,
                &RealIpResponse {
                    real_ip: check.normalized(),
                },
            )
        }
        Err(e) => {
            tracing::debug!("Rejected check request: {}", e);
            (StatusCode::BAD_REQUEST, INVALID_ADDRESS_MESSAGE).into_response()
        }
    }
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "networks": state.query.network_count(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serialize `value` as the JSON body, logging instead of panicking on failure
fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to marshal response into JSON: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use ipnets_core::NetworkSet;
    use tower::ServiceExt;

    fn app_with(networks: &[&str]) -> Router {
        let set = Arc::new(NetworkSet::new());
        set.replace(networks.iter().map(|s| s.parse().unwrap()));
        router(Arc::new(AppState {
            query: QueryService::new(set),
        }))
    }

    async fn get(app: Router, uri: &str, real_ip: Option<&str>) -> (StatusCode, String, String) {
        let mut request = Request::builder().uri(uri);
        if let Some(ip) = real_ip {
            request = request.header("X-Real-IP", ip);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_list_networks() {
        let app = app_with(&["198.51.100.0/24", "192.0.2.77/24"]);
        let (status, content_type, body) = get(app, "/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        assert_eq!(body, r#"["192.0.2.0/24","198.51.100.0/24"]"#);
    }

    #[tokio::test]
    async fn test_list_empty_set_is_empty_array() {
        let (status, _, body) = get(app_with(&[]), "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn test_check_matched_is_service_unavailable() {
        let app = app_with(&["10.0.0.0/8"]);
        let (status, content_type, body) = get(app, "/check", Some("10.1.2.3")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(content_type, "application/json");
        assert_eq!(body, r#"{"real_ip":"10.1.2.3"}"#);
    }

    #[tokio::test]
    async fn test_check_unmatched_is_ok() {
        let app = app_with(&["192.168.0.0/16"]);
        let (status, _, body) = get(app, "/check", Some("10.1.2.3")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"real_ip":"10.1.2.3"}"#);
    }

    #[tokio::test]
    async fn test_check_normalizes_address() {
        let app = app_with(&["10.0.0.0/8"]);
        let (status, _, body) = get(app, "/check", Some("::ffff:10.1.2.3")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, r#"{"real_ip":"10.1.2.3"}"#);
    }

    #[tokio::test]
    async fn test_check_missing_or_malformed_header() {
        for real_ip in [None, Some(""), Some("bogus"), Some("10.1.2.0/24")] {
            let (status, content_type, body) = get(app_with(&["0.0.0.0/0"]), "/check", real_ip).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "header {:?}", real_ip);
            assert!(content_type.starts_with("text/plain"));
            assert_eq!(body, INVALID_ADDRESS_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = get(app_with(&["10.0.0.0/8"]), "/health", None).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["networks"], 1);
    }
}
