//! Health check handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub async fn health_handler() -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
