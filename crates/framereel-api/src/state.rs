//! Application state.

use std::sync::Arc;

use framereel_media::{Encoder, FfmpegEncoder, FrameConverter, SharedProgress, SharedProgressSink};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub converter: FrameConverter,
    pub progress: Arc<SharedProgress>,
}

impl AppState {
    /// Create application state backed by the FFmpeg encoder.
    pub fn new(config: ApiConfig) -> Self {
        let encoder = Arc::new(FfmpegEncoder::new(Some(config.ffmpeg_fallback_path.clone())));
        Self::with_encoder(config, encoder)
    }

    /// Create application state with an explicit encoder.
    pub fn with_encoder(config: ApiConfig, encoder: Arc<dyn Encoder>) -> Self {
        let progress = Arc::new(SharedProgress::new());
        let sink: SharedProgressSink = progress.clone();
        let converter = FrameConverter::new(config.converter_config(), encoder, sink);

        Self {
            config,
            converter,
            progress,
        }
    }
}
