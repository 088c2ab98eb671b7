//! Service info handlers.

use axum::Json;
use chrono::Utc;
use serde::Serialize;

pub const SERVICE_NAME: &str = "Framereel PNG to Video API";

#[derive(Serialize)]
pub struct IndexResponse {
    pub message: String,
    pub version: String,
}

/// `GET /api/`
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// `GET /api/status`
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
