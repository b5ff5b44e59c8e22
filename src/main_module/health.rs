//! Liveness endpoints for the hosting platform.

use axum::http::StatusCode;
use axum::Json;

pub async fn index() -> &'static str {
    "Ticket bot is running"
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "ticketbot",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
