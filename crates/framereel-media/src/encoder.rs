//! Encoder abstraction and the driver that runs one encode.
//!
//! An [`Encoder`] launches a process for an [`EncodeJob`] and hands back an
//! [`EncoderProcess`]: a lazy sequence of diagnostic lines followed by an exit
//! status. [`EncoderDriver`] consumes the lines, turns frame counters into
//! progress and maps the exit status onto a result.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use framereel_models::progress::{encode_progress, ENCODE_PROGRESS_START};
use framereel_models::{EncodePreset, EncodeTarget};
use metrics::histogram;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, error, info};

use crate::command::{is_progress_line, parse_frame_counter, resolve_ffmpeg, FfmpegCommand};
use crate::error::{ConversionError, ConversionResult};
use crate::progress::SharedProgressSink;

/// Number of trailing diagnostic lines kept for error reports.
const MAX_DIAGNOSTIC_LINES: usize = 64;

/// Everything an encoder needs to produce one output file.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Directory holding `frame_%06d.png`
    pub frames_dir: PathBuf,
    /// Number of staged frames
    pub total_frames: usize,
    /// Input frame rate
    pub fps: u32,
    pub target: EncodeTarget,
    pub preset: EncodePreset,
    /// Where the encoded file is written
    pub output_path: PathBuf,
}

impl EncodeJob {
    pub fn new(
        frames_dir: impl AsRef<Path>,
        total_frames: usize,
        fps: u32,
        target: EncodeTarget,
        output_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            frames_dir: frames_dir.as_ref().to_path_buf(),
            total_frames,
            fps,
            target,
            preset: target.preset(),
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    /// FFmpeg invocation for this job.
    pub fn command(&self) -> FfmpegCommand {
        FfmpegCommand::image_sequence(&self.frames_dir, self.fps, &self.output_path)
            .preset(&self.preset)
    }
}

/// How an encoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderExit {
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability to launch an encode.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Start encoding `job`.
    async fn launch(&self, job: &EncodeJob) -> ConversionResult<Box<dyn EncoderProcess>>;
}

/// A running encode.
#[async_trait]
pub trait EncoderProcess: Send {
    /// Next diagnostic line, or `None` once the stream is closed.
    async fn next_line(&mut self) -> ConversionResult<Option<String>>;

    /// Wait for the process to exit.
    async fn wait(self: Box<Self>) -> ConversionResult<EncoderExit>;
}

/// Encoder backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    fallback: Option<PathBuf>,
    binary: Option<PathBuf>,
}

impl FfmpegEncoder {
    /// Create an encoder that falls back to `fallback` when FFmpeg is not on `PATH`.
    pub fn new(fallback: Option<PathBuf>) -> Self {
        Self {
            fallback,
            binary: None,
        }
    }

    /// Create an encoder that always runs `binary`, skipping `PATH` lookup.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            fallback: None,
            binary: Some(binary.into()),
        }
    }

    /// Resolve the binary this encoder would run.
    pub fn binary(&self) -> ConversionResult<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => resolve_ffmpeg(self.fallback.as_deref()),
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn launch(&self, job: &EncodeJob) -> ConversionResult<Box<dyn EncoderProcess>> {
        let binary = self.binary()?;
        let args = job.command().build_args();
        info!("Using FFmpeg binary: {}", binary.display());
        debug!("FFmpeg command: {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::internal("FFmpeg stderr not captured"))?;

        Ok(Box::new(FfmpegProcess {
            child,
            stderr: BufReader::new(stderr),
        }))
    }
}

struct FfmpegProcess {
    child: Child,
    stderr: BufReader<ChildStderr>,
}

#[async_trait]
impl EncoderProcess for FfmpegProcess {
    async fn next_line(&mut self) -> ConversionResult<Option<String>> {
        // FFmpeg may echo non-UTF-8 paths; decode lossily instead of failing.
        let mut buf = Vec::new();
        if self.stderr.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn wait(mut self: Box<Self>) -> ConversionResult<EncoderExit> {
        let status = self.child.wait().await?;
        Ok(EncoderExit {
            code: status.code(),
        })
    }
}

/// Lifecycle of a single encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeState {
    NotStarted,
    Launched,
    Streaming,
    Succeeded,
    Failed,
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub output_path: PathBuf,
    /// Highest frame counter the encoder reported
    pub frames_reported: u64,
    pub state: EncodeState,
}

/// Runs one encode job against an [`Encoder`], reporting progress.
pub struct EncoderDriver<'a> {
    encoder: &'a dyn Encoder,
    progress: SharedProgressSink,
    state: EncodeState,
}

impl<'a> EncoderDriver<'a> {
    pub fn new(encoder: &'a dyn Encoder, progress: SharedProgressSink) -> Self {
        Self {
            encoder,
            progress,
            state: EncodeState::NotStarted,
        }
    }

    pub fn state(&self) -> EncodeState {
        self.state
    }

    fn transition(&mut self, next: EncodeState) {
        debug!(from = ?self.state, to = ?next, "Encoder state change");
        self.state = next;
    }

    /// Launch the encoder, stream its diagnostics and wait for it to exit.
    pub async fn run(&mut self, job: &EncodeJob) -> ConversionResult<EncodeOutcome> {
        let start = Instant::now();
        self.progress.set(ENCODE_PROGRESS_START, "Starting video encoding");
        info!(
            format = %job.target,
            fps = job.fps,
            frames = job.total_frames,
            codec = %job.preset.codec,
            "Encoding video"
        );

        let mut process = match self.encoder.launch(job).await {
            Ok(process) => process,
            Err(e) => {
                self.transition(EncodeState::Failed);
                return Err(e);
            }
        };
        self.transition(EncodeState::Launched);

        let mut diagnostics = VecDeque::with_capacity(MAX_DIAGNOSTIC_LINES);
        let mut frames_reported = 0;

        loop {
            let line = match process.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    // Still reap the child before giving up on its output.
                    let _ = process.wait().await;
                    self.transition(EncodeState::Failed);
                    return Err(e);
                }
            };

            if let Some(frame) = parse_frame_counter(&line) {
                if self.state == EncodeState::Launched {
                    self.transition(EncodeState::Streaming);
                }
                frames_reported = frames_reported.max(frame);
                self.progress
                    .set(encode_progress(frame, job.total_frames), "Encoding video");
            }

            if !is_progress_line(&line) && !line.trim().is_empty() {
                if diagnostics.len() == MAX_DIAGNOSTIC_LINES {
                    diagnostics.pop_front();
                }
                diagnostics.push_back(line);
            }
        }

        let exit = match process.wait().await {
            Ok(exit) => exit,
            Err(e) => {
                self.transition(EncodeState::Failed);
                return Err(e);
            }
        };
        let diagnostics = Vec::from(diagnostics).join("\n");
        histogram!("framereel_encode_duration_seconds", "format" => job.target.extension())
            .record(start.elapsed().as_secs_f64());

        if !exit.success() {
            self.transition(EncodeState::Failed);
            error!(exit_code = ?exit.code, "FFmpeg error: {}", diagnostics);
            return Err(ConversionError::encoding_failed(diagnostics, exit.code));
        }

        if !tokio::fs::try_exists(&job.output_path).await.unwrap_or(false) {
            self.transition(EncodeState::Failed);
            return Err(ConversionError::encoding_failed(
                format!("encoder exited cleanly but wrote no output\n{}", diagnostics),
                exit.code,
            ));
        }

        self.transition(EncodeState::Succeeded);
        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            frames = frames_reported,
            "Encoding complete"
        );

        Ok(EncodeOutcome {
            output_path: job.output_path.clone(),
            frames_reported,
            state: self.state,
        })
    }
}

/// Encoder that replays scripted diagnostic lines instead of running FFmpeg.
///
/// On a zero exit code it writes placeholder bytes to the job's output path.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct ScriptedEncoder {
    lines: Vec<String>,
    exit_code: Option<i32>,
    jobs: std::sync::Arc<std::sync::Mutex<Vec<EncodeJob>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ScriptedEncoder {
    /// Succeeds after reporting one `frame=N` line per frame.
    pub fn succeeding(total_frames: u64) -> Self {
        let mut lines: Vec<String> = (1..=total_frames)
            .flat_map(|n| [format!("frame={}", n), "progress=continue".to_string()])
            .collect();
        lines.push("progress=end".to_string());
        Self::new(lines, Some(0))
    }

    /// Exits with `exit_code` after emitting `stderr`.
    pub fn failing(stderr: &str, exit_code: i32) -> Self {
        Self::new(stderr.lines().map(str::to_string).collect(), Some(exit_code))
    }

    pub fn new(lines: Vec<String>, exit_code: Option<i32>) -> Self {
        Self {
            lines,
            exit_code,
            jobs: Default::default(),
        }
    }

    /// Jobs this encoder was launched with.
    pub fn jobs(&self) -> Vec<EncodeJob> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn launch(&self, job: &EncodeJob) -> ConversionResult<Box<dyn EncoderProcess>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(job.clone());

        Ok(Box::new(ScriptedProcess {
            lines: self.lines.clone().into(),
            exit_code: self.exit_code,
            output_path: job.output_path.clone(),
        }))
    }
}

#[cfg(any(test, feature = "test-util"))]
struct ScriptedProcess {
    lines: VecDeque<String>,
    exit_code: Option<i32>,
    output_path: PathBuf,
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl EncoderProcess for ScriptedProcess {
    async fn next_line(&mut self) -> ConversionResult<Option<String>> {
        Ok(self.lines.pop_front())
    }

    async fn wait(self: Box<Self>) -> ConversionResult<EncoderExit> {
        if self.exit_code == Some(0) {
            tokio::fs::write(&self.output_path, b"\x00\x00\x00\x18ftypisom").await?;
        }
        Ok(EncoderExit {
            code: self.exit_code,
        })
    }
}
