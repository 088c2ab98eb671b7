//! FFmpeg command builder, binary lookup and diagnostic line parsing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use framereel_models::{EncodePreset, FRAME_PATTERN};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ConversionError, ConversionResult};

/// Fallback binary location when FFmpeg is not on `PATH`.
pub const DEFAULT_FALLBACK_PATH: &str = "vendor/ffmpeg/ffmpeg";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or sequence pattern
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Read a numbered frame sequence from `frames_dir` at `fps`.
    pub fn image_sequence(frames_dir: impl AsRef<Path>, fps: u32, output: impl AsRef<Path>) -> Self {
        Self::new(frames_dir.as_ref().join(FRAME_PATTERN), output).framerate(fps)
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set input frame rate.
    pub fn framerate(self, fps: u32) -> Self {
        self.input_arg("-framerate").input_arg(fps.to_string())
    }

    /// Apply an encode preset.
    pub fn preset(self, preset: &EncodePreset) -> Self {
        self.output_args(preset.to_ffmpeg_args())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        // Errors only; progress comes from -progress below
        args.push("-v".to_string());
        args.push("error".to_string());

        // Machine-readable progress on stderr, one key=value per line
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Extract the frame counter from an encoder diagnostic line.
///
/// Accepts both `-progress` output (`frame=42`) and classic stats lines
/// (`frame=   42 fps=...`).
pub fn parse_frame_counter(line: &str) -> Option<u64> {
    let (_, rest) = line.split_once("frame=")?;
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Whether a line belongs to FFmpeg's `-progress` key=value block.
pub fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame",
        "fps",
        "bitrate",
        "total_size",
        "out_time_us",
        "out_time_ms",
        "out_time",
        "dup_frames",
        "drop_frames",
        "speed",
        "progress",
    ];

    match line.trim().split_once('=') {
        Some((key, _)) => KEYS.contains(&key) || key.starts_with("stream_"),
        None => false,
    }
}

/// Resolve the FFmpeg binary: `PATH` first, then `fallback` if it exists.
pub fn resolve_ffmpeg(fallback: Option<&Path>) -> ConversionResult<PathBuf> {
    match which::which("ffmpeg") {
        Ok(path) => {
            debug!("Using system FFmpeg: {}", path.display());
            return Ok(path);
        }
        Err(e) => warn!("Could not find system FFmpeg: {}", e),
    }

    match fallback {
        Some(path) if path.is_file() => {
            warn!("Using fallback FFmpeg at {} (may have dependency issues)", path.display());
            Ok(path.to_path_buf())
        }
        _ => Err(ConversionError::EncoderUnavailable),
    }
}

/// Run `ffmpeg -version` and return its first line.
pub async fn ffmpeg_version(binary: &Path) -> ConversionResult<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ConversionError::EncoderUnavailable);
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    info!("Using FFmpeg: {}", version);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framereel_models::EncodeTarget;

    #[test]
    fn test_image_sequence_command() {
        let cmd = FfmpegCommand::image_sequence("/tmp/s/frames", 30, "/tmp/s/output.mp4")
            .preset(&EncodeTarget::Mp4.preset());

        let args = cmd.build_args();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let rate_pos = args.iter().position(|a| a == "-framerate").unwrap();

        assert!(rate_pos < input_pos, "framerate must be an input option");
        assert_eq!(args[rate_pos + 1], "30");
        assert_eq!(args[input_pos + 1], "/tmp/s/frames/frame_%06d.png");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/s/output.mp4");
        assert_eq!(&args[..3], &["-y".to_string(), "-v".to_string(), "error".to_string()]);
    }

    #[test]
    fn test_parse_frame_counter() {
        assert_eq!(parse_frame_counter("frame=42"), Some(42));
        assert_eq!(parse_frame_counter("frame=   17 fps=0.0 q=0.0 size=0kB"), Some(17));
        assert_eq!(parse_frame_counter("frame=N/A"), None);
        assert_eq!(parse_frame_counter("fps=25.0"), None);
        assert_eq!(parse_frame_counter("Error opening input file"), None);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("frame=3"));
        assert!(is_progress_line("out_time_us=100000"));
        assert!(is_progress_line("stream_0_0_q=28.0"));
        assert!(is_progress_line("progress=end"));
        assert!(!is_progress_line("[image2 @ 0x55] Could find no file with path"));
        assert!(!is_progress_line("Conversion failed!"));
    }

    #[test]
    fn test_missing_fallback_is_unavailable() {
        let fallback = Path::new("/definitely/not/here/ffmpeg");
        if which::which("ffmpeg").is_err() {
            assert!(matches!(
                resolve_ffmpeg(Some(fallback)),
                Err(ConversionError::EncoderUnavailable)
            ));
        } else {
            assert!(resolve_ffmpeg(Some(fallback)).is_ok());
        }
    }
}
