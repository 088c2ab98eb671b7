//! Progress polling handler.

use axum::extract::State;
use axum::Json;
use framereel_media::ProgressSink;
use serde::Serialize;

use crate::state::AppState;

/// Progress response.
#[derive(Serialize)]
pub struct ProgressResponse {
    /// Percentage in `[0, 100]`
    pub progress: f64,
    pub message: String,
}

/// `GET /api/progress`
///
/// Reports the most recent update from whichever conversion wrote last.
pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let snapshot = state.progress.snapshot();
    Json(ProgressResponse {
        progress: snapshot.percent,
        message: snapshot.message,
    })
}
