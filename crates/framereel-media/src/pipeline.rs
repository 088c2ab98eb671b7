//! Frame-to-video conversion pipeline.
//!
//! `convert` validates and orders the uploads, stages them into a fresh
//! session directory, encodes them and hands back an [`EncodedFile`] that
//! owns the session. The session directory is removed when the file handle is
//! dropped, or immediately if any stage fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use framereel_models::encoding::{DEFAULT_FRAME_RATE, MAX_FRAME_RATE};
use framereel_models::progress::{CLEANUP_PROGRESS, COMPLETE_PROGRESS};
use framereel_models::{EncodeTarget, UploadedFrame, MAX_FRAMES};
use metrics::{counter, histogram};
use tracing::{error, info, instrument, warn};

use crate::encoder::{EncodeJob, Encoder, EncoderDriver};
use crate::error::{ConversionError, ConversionResult};
use crate::ordering::order_frames;
use crate::progress::SharedProgressSink;
use crate::session::ConversionSession;
use crate::stager::FrameStager;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Directory under which per-conversion sessions are created
    pub scratch_root: PathBuf,
    /// Frame rate used when a request does not specify one
    pub frame_rate: u32,
    /// Maximum number of uploaded files per conversion
    pub max_frames: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("framereel"),
            frame_rate: DEFAULT_FRAME_RATE,
            max_frames: MAX_FRAMES,
        }
    }
}

/// A finished encode, ready to be streamed to the client.
///
/// Owns the conversion session: dropping this value removes the scratch
/// directory, including the encoded file.
#[derive(Debug)]
pub struct EncodedFile {
    path: PathBuf,
    target: EncodeTarget,
    size: u64,
    session: ConversionSession,
}

impl EncodedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attachment name (`output.mp4`, `output.mov`).
    pub fn file_name(&self) -> String {
        self.target.output_file_name()
    }

    pub fn mime_type(&self) -> &'static str {
        self.target.mime_type()
    }

    /// Size of the encoded file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Session directory that holds the file.
    pub fn session_dir(&self) -> &Path {
        self.session.path()
    }
}

/// Converts uploaded frame sequences into video files.
#[derive(Clone)]
pub struct FrameConverter {
    config: ConverterConfig,
    encoder: Arc<dyn Encoder>,
    progress: SharedProgressSink,
}

impl FrameConverter {
    pub fn new(config: ConverterConfig, encoder: Arc<dyn Encoder>, progress: SharedProgressSink) -> Self {
        Self {
            config,
            encoder,
            progress,
        }
    }

    /// Convert `files` into a `format` video at the configured frame rate.
    pub async fn convert(&self, files: Vec<UploadedFrame>, format: &str) -> ConversionResult<EncodedFile> {
        self.convert_with_fps(files, format, None).await
    }

    /// Convert with an explicit frame rate (`None` uses the configured rate).
    #[instrument(skip(self, files), fields(uploads = files.len()))]
    pub async fn convert_with_fps(
        &self,
        files: Vec<UploadedFrame>,
        format: &str,
        fps: Option<u32>,
    ) -> ConversionResult<EncodedFile> {
        let start = Instant::now();
        self.progress.set(0.0, "Processing files");

        let result = self.run(files, format, fps).await;

        let format_label = format
            .parse::<EncodeTarget>()
            .map(|t| t.extension())
            .unwrap_or("unsupported");
        match &result {
            Ok(file) => {
                self.progress.set(COMPLETE_PROGRESS, "Complete");
                counter!("framereel_conversions_total", "format" => format_label, "outcome" => "success")
                    .increment(1);
                histogram!("framereel_conversion_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                info!(
                    output = %file.path().display(),
                    bytes = file.size(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Conversion complete"
                );
            }
            Err(e) => {
                self.progress.set(0.0, &format!("Error: {}", e));
                counter!("framereel_conversions_total", "format" => format_label, "outcome" => e.kind())
                    .increment(1);
                error!(kind = e.kind(), "Conversion error: {}", e);
            }
        }

        result
    }

    async fn run(
        &self,
        files: Vec<UploadedFrame>,
        format: &str,
        fps: Option<u32>,
    ) -> ConversionResult<EncodedFile> {
        // Validation happens before any filesystem access.
        let target: EncodeTarget = format.parse()?;
        let fps = validate_fps(fps.unwrap_or(self.config.frame_rate))?;
        info!("Received {} files for conversion", files.len());
        let sequence = order_frames(files, self.config.max_frames)?;
        info!(
            frames = sequence.len(),
            skipped = sequence.skipped().len(),
            "Sorted files"
        );
        let total_frames = sequence.len();

        let session = ConversionSession::create(&self.config.scratch_root)?;

        let staged = FrameStager::new(self.progress.clone())
            .stage(sequence, &session.frames_dir())
            .await?;
        counter!("framereel_frames_staged_total").increment(staged.count as u64);

        let job = EncodeJob::new(
            &staged.dir,
            total_frames,
            fps,
            target,
            session.output_path(target),
        );
        let mut driver = EncoderDriver::new(self.encoder.as_ref(), self.progress.clone());
        let outcome = match driver.run(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(state = ?driver.state(), "Encoder did not finish");
                return Err(e);
            }
        };

        self.progress.set(CLEANUP_PROGRESS, "Cleaning up");
        session.discard_frames().await;

        let size = tokio::fs::metadata(&outcome.output_path).await?.len();

        Ok(EncodedFile {
            path: outcome.output_path,
            target,
            size,
            session,
        })
    }
}

fn validate_fps(fps: u32) -> ConversionResult<u32> {
    if (1..=MAX_FRAME_RATE).contains(&fps) {
        Ok(fps)
    } else {
        Err(ConversionError::UnsupportedFormat(format!(
            "frame rate {} (expected 1-{})",
            fps, MAX_FRAME_RATE
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{MockEncoder, ScriptedEncoder};
    use framereel_models::progress::ENCODE_PROGRESS_START;
    use crate::progress::{ProgressSink, RecordingProgress};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png(shade: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([shade, shade, shade])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn uploads(names: &[&str]) -> Vec<UploadedFrame> {
        names
            .iter()
            .map(|name| UploadedFrame::new(*name, png(200)))
            .collect()
    }

    struct Fixture {
        scratch: TempDir,
        encoder: Arc<ScriptedEncoder>,
        progress: Arc<RecordingProgress>,
        converter: FrameConverter,
    }

    fn fixture(encoder: ScriptedEncoder) -> Fixture {
        let scratch = TempDir::new().unwrap();
        let encoder = Arc::new(encoder);
        let progress = Arc::new(RecordingProgress::new());
        let config = ConverterConfig {
            scratch_root: scratch.path().join("scratch"),
            ..Default::default()
        };
        let converter = FrameConverter::new(config, encoder.clone(), progress.clone());
        Fixture {
            scratch,
            encoder,
            progress,
            converter,
        }
    }

    fn residual_entries(f: &Fixture) -> usize {
        std::fs::read_dir(f.scratch.path().join("scratch"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_three_frame_mp4_conversion() {
        let f = fixture(ScriptedEncoder::succeeding(3));

        let file = f
            .converter
            .convert(
                uploads(&["shape_003.png", "shape_001.png", "shape_002.png"]),
                "mp4",
            )
            .await
            .unwrap();

        assert_eq!(file.file_name(), "output.mp4");
        assert_eq!(file.mime_type(), "video/mp4");
        assert!(file.path().exists());
        assert!(file.size() > 0);

        let jobs = f.encoder.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].total_frames, 3);
        assert_eq!(jobs[0].fps, 30);
        let args = jobs[0].command().build_args();
        assert!(args.iter().any(|a| a.ends_with("frame_%06d.png")));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));

        // Frames are discarded once encoded; only the output remains.
        assert!(!file.session_dir().join("frames").exists());

        drop(file);
        assert_eq!(residual_entries(&f), 0);
    }

    #[tokio::test]
    async fn test_progress_phases() {
        let f = fixture(ScriptedEncoder::succeeding(2));

        let file = f
            .converter
            .convert(uploads(&["a1.png", "a2.png"]), "mov")
            .await
            .unwrap();
        drop(file);

        let percents = f.progress.percents();
        assert_eq!(percents.first(), Some(&0.0));
        assert_eq!(percents.last(), Some(&100.0));

        let staging: Vec<f64> = percents[1..3].to_vec();
        assert_eq!(staging, vec![30.0, 60.0]);

        let encoding: Vec<f64> = percents
            .iter()
            .copied()
            .filter(|p| *p >= 70.0 && *p <= 95.0)
            .collect();
        assert_eq!(encoding.first(), Some(&70.0));
        assert_eq!(encoding.last(), Some(&95.0));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_too_many_frames_creates_no_session() {
        let f = fixture(ScriptedEncoder::succeeding(1));
        let files: Vec<_> = (0..1200)
            .map(|i| UploadedFrame::new(format!("f{}.png", i), Vec::new()))
            .collect();

        let err = f.converter.convert(files, "mp4").await.unwrap_err();

        assert!(matches!(err, ConversionError::TooManyFrames { count: 1200, .. }));
        assert!(!f.scratch.path().join("scratch").exists());
        assert!(f.encoder.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_format_creates_no_session() {
        let f = fixture(ScriptedEncoder::succeeding(1));

        let err = f
            .converter
            .convert(uploads(&["a1.png"]), "webm")
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::UnsupportedFormat(_)));
        assert!(!f.scratch.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn test_no_valid_frames() {
        let f = fixture(ScriptedEncoder::succeeding(1));

        let err = f
            .converter
            .convert(uploads(&["cover.png", "readme.txt"]), "mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::NoValidFrames));
        assert_eq!(f.progress.snapshot().percent, 0.0);
        assert!(f.progress.snapshot().message.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_encoder_failure_cleans_up() {
        let f = fixture(ScriptedEncoder::failing("Invalid argument\nConversion failed!", 1));

        let err = f
            .converter
            .convert(uploads(&["a1.png", "a2.png"]), "mp4")
            .await
            .unwrap_err();

        assert_eq!(err.diagnostics(), Some("Invalid argument\nConversion failed!"));
        assert_eq!(residual_entries(&f), 0);
        assert_eq!(f.progress.snapshot().percent, 0.0);
    }

    #[tokio::test]
    async fn test_missing_encoder_after_staging_cleans_up() {
        let scratch = TempDir::new().unwrap();
        let mut encoder = MockEncoder::new();
        encoder
            .expect_launch()
            .withf(|job| job.frames_dir.join("frame_000001.png").is_file())
            .times(1)
            .returning(|_| Err(ConversionError::EncoderUnavailable));
        let progress = Arc::new(RecordingProgress::new());
        let config = ConverterConfig {
            scratch_root: scratch.path().join("scratch"),
            ..Default::default()
        };
        let converter = FrameConverter::new(config, Arc::new(encoder), progress.clone());

        let err = converter
            .convert(uploads(&["a1.png", "a2.png"]), "mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::EncoderUnavailable));
        let residual = std::fs::read_dir(scratch.path().join("scratch")).unwrap().count();
        assert_eq!(residual, 0);

        let last = progress.snapshot();
        assert_eq!(last.percent, 0.0);
        assert!(last.message.starts_with("Error:"));
        assert!(progress.percents().contains(&ENCODE_PROGRESS_START));
    }

    #[tokio::test]
    async fn test_stage_failure_cleans_up() {
        let f = fixture(ScriptedEncoder::succeeding(2));
        let files = vec![
            UploadedFrame::new("a1.png", png(10)),
            UploadedFrame::new("a2.png", b"garbage".to_vec()),
        ];

        let err = f.converter.convert(files, "mp4").await.unwrap_err();

        assert!(matches!(err, ConversionError::FrameStage { ref filename, .. } if filename == "a2.png"));
        assert_eq!(residual_entries(&f), 0);
        assert!(f.encoder.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_frame_rate_override() {
        let f = fixture(ScriptedEncoder::succeeding(1));

        let file = f
            .converter
            .convert_with_fps(uploads(&["a1.png"]), "mp4", Some(24))
            .await
            .unwrap();
        drop(file);
        assert_eq!(f.encoder.jobs()[0].fps, 24);

        let err = f
            .converter
            .convert_with_fps(uploads(&["a1.png"]), "mp4", Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedFormat(_)));
    }
}
