//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use framereel_media::command::DEFAULT_FALLBACK_PATH;
use framereel_media::ConverterConfig;
use framereel_models::encoding::DEFAULT_FRAME_RATE;
use framereel_models::MAX_FRAMES;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second on the conversion route
    pub rate_limit_rps: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Root directory for conversion sessions
    pub scratch_dir: PathBuf,
    /// Default output frame rate
    pub frame_rate: u32,
    /// Maximum uploaded files per conversion
    pub max_frames: usize,
    /// FFmpeg binary used when none is on `PATH`
    pub ffmpeg_fallback_path: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 2,
            request_timeout: Duration::from_secs(300),
            max_body_size: 512 * 1024 * 1024, // 512MB
            environment: "development".to_string(),
            scratch_dir: std::env::temp_dir().join("framereel"),
            frame_rate: DEFAULT_FRAME_RATE,
            max_frames: MAX_FRAMES,
            ffmpeg_fallback_path: PathBuf::from(DEFAULT_FALLBACK_PATH),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            frame_rate: env_parse("FRAME_RATE").unwrap_or(defaults.frame_rate),
            max_frames: env_parse("MAX_FRAMES").unwrap_or(defaults.max_frames),
            ffmpeg_fallback_path: std::env::var("FFMPEG_FALLBACK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_fallback_path),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Pipeline settings derived from this config.
    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            scratch_root: self.scratch_dir.clone(),
            frame_rate: self.frame_rate,
            max_frames: self.max_frames,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
