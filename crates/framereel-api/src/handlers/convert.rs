//! Frame sequence upload and conversion.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use framereel_media::{ConversionError, EncodedFile};
use framereel_models::{EncodeTarget, UploadedFrame};
use futures_util::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying frame files.
pub const FILES_FIELD: &str = "files[]";

/// Parsed `/api/convert` form.
#[derive(Debug, Default)]
struct ConvertForm {
    files: Vec<UploadedFrame>,
    format: Option<String>,
    fps: Option<u32>,
    saw_files_field: bool,
}

impl ConvertForm {
    async fn read(multipart: &mut Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                FILES_FIELD | "files" => {
                    form.saw_files_field = true;
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", filename, e)))?;

                    // Browsers send an empty part when no file was chosen
                    if filename.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFrame::new(filename, data.to_vec()));
                }
                "format" => {
                    let value = read_text(field).await?;
                    if !value.trim().is_empty() {
                        form.format = Some(value);
                    }
                }
                "fps" => {
                    let value = read_text(field).await?;
                    let value = value.trim();
                    if !value.is_empty() {
                        let fps = value
                            .parse()
                            .map_err(|_| ApiError::bad_request(format!("Invalid fps: {}", value)))?;
                        form.fps = Some(fps);
                    }
                }
                other => debug!("Ignoring multipart field {:?}", other),
            }
        }

        Ok(form)
    }

    fn upload_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {}", e)))
}

/// `POST /api/convert`
///
/// Streams the encoded video back as an attachment. The conversion runs on
/// its own task, so a dropped connection does not interrupt the encoder or
/// skip session cleanup.
pub async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let form = ConvertForm::read(&mut multipart).await?;

    if !form.saw_files_field {
        return Err(ApiError::bad_request("No files provided"));
    }
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files selected"));
    }

    let format = form
        .format
        .clone()
        .unwrap_or_else(|| EncodeTarget::default().extension().to_string());
    metrics::record_upload(form.files.len(), form.upload_bytes());
    info!(
        files = form.files.len(),
        bytes = form.upload_bytes(),
        format = %format,
        fps = ?form.fps,
        "Video conversion request received"
    );

    let converter = state.converter.clone();
    let ConvertForm { files, fps, .. } = form;
    let encoded = tokio::spawn(async move { converter.convert_with_fps(files, &format, fps).await })
        .await
        .map_err(|e| ApiError::internal(format!("conversion task failed: {}", e)))??;

    attachment(encoded).await
}

async fn attachment(encoded: EncodedFile) -> ApiResult<Response> {
    let file = File::open(encoded.path()).await.map_err(ConversionError::from)?;

    let headers = [
        (header::CONTENT_TYPE, encoded.mime_type().to_string()),
        (header::CONTENT_LENGTH, encoded.size().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", encoded.file_name()),
        ),
    ];

    info!(
        file = %encoded.file_name(),
        size = encoded.size(),
        session = %encoded.session_dir().display(),
        "Streaming encoded video"
    );

    let body = Body::from_stream(EncodedFileStream::new(file, encoded));
    Ok((headers, body).into_response())
}

/// Response body that owns the encoded file's session.
///
/// The session directory is removed when the body is dropped, after the last
/// chunk has been sent or the client has gone away.
struct EncodedFileStream {
    inner: ReaderStream<File>,
    _encoded: EncodedFile,
}

impl EncodedFileStream {
    fn new(file: File, encoded: EncodedFile) -> Self {
        Self {
            inner: ReaderStream::new(file),
            _encoded: encoded,
        }
    }
}

impl Stream for EncodedFileStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
