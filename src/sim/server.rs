use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderName, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::SimDevice;

const CORS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

/// Every path answers with the device status; `/relay/on` and `/relay/off`
/// switch the relay first.
pub fn router(device: Arc<SimDevice>) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(device)
        .layer(TraceLayer::new_for_http())
}

fn relay_command(path: &str) -> Option<bool> {
    match path {
        "/relay/on" => Some(true),
        "/relay/off" => Some(false),
        _ => None,
    }
}

async fn handle(State(device): State<Arc<SimDevice>>, method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            CORS,
            [(header::ACCESS_CONTROL_MAX_AGE, "3600")],
        )
            .into_response();
    }
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, CORS).into_response();
    }

    match device.serve(relay_command(uri.path())).await {
        Ok(report) => (
            StatusCode::OK,
            CORS,
            [(header::CACHE_CONTROL, "no-store")],
            Json(report),
        )
            .into_response(),
        Err(message) => {
            warn!("Failing request to {}: {}", uri.path(), message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                CORS,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}
