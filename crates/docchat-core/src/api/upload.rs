//! Multipart uploads with progress reporting.
//!
//! File bodies are streamed into the form. Progress is the share of file
//! payload bytes handed to the transport, rounded to a whole percent.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;

use super::error::{ApiError, ApiResult};

/// Callback receiving integer percentages in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
enum Source {
    Path(PathBuf),
    Bytes(Bytes),
}

/// One file attached to a multipart request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    file_name: String,
    mime: String,
    source: Source,
}

impl UploadFile {
    /// A file read from disk when the request is sent.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let mime = mime_for_path(&path).to_string();
        Self {
            file_name,
            mime,
            source: Source::Path(path),
        }
    }

    /// An in-memory payload.
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime = mime_for_path(Path::new(&file_name)).to_string();
        Self {
            file_name,
            mime,
            source: Source::Bytes(bytes.into()),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    async fn len(&self) -> ApiResult<u64> {
        match &self.source {
            Source::Bytes(bytes) => Ok(bytes.len() as u64),
            Source::Path(path) => tokio::fs::metadata(path)
                .await
                .map(|meta| meta.len())
                .map_err(|err| {
                    ApiError::local(format!("Failed to read {}: {err}", path.display()))
                }),
        }
    }
}

/// Guesses a MIME type from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html" | "htm") => "text/html",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

/// Whole-percent progress, or `None` when the total is unknown.
pub fn percent(loaded: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let loaded = loaded.min(total);
    // Round half up without going through floats.
    let pct = (loaded.saturating_mul(200) + total) / total.saturating_mul(2);
    Some(pct.min(100) as u8)
}

/// Accumulates transferred bytes and reports percentages.
pub struct ProgressTracker {
    loaded: u64,
    total: u64,
    callback: ProgressFn,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: ProgressFn) -> Self {
        Self {
            loaded: 0,
            total,
            callback,
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.loaded = self.loaded.saturating_add(bytes);
        if let Some(pct) = percent(self.loaded, self.total) {
            (self.callback)(pct);
        }
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }
}

type SharedTracker = Option<Arc<Mutex<ProgressTracker>>>;

fn track<S>(
    stream: S,
    tracker: SharedTracker,
) -> impl Stream<Item = io::Result<Bytes>> + Send + Sync + 'static
where
    S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
{
    stream.map(move |chunk| {
        if let (Ok(bytes), Some(tracker)) = (&chunk, &tracker)
            && let Ok(mut tracker) = tracker.lock()
        {
            tracker.advance(bytes.len() as u64);
        }
        chunk
    })
}

fn chunked(bytes: Bytes) -> Vec<io::Result<Bytes>> {
    let mut chunks = Vec::with_capacity(bytes.len() / CHUNK_SIZE + 1);
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + CHUNK_SIZE).min(bytes.len());
        chunks.push(Ok(bytes.slice(start..end)));
        start = end;
    }
    chunks
}

/// Builds a multipart form with every file under `field`.
pub(crate) async fn build_form(
    field: &str,
    files: Vec<UploadFile>,
    progress: Option<ProgressFn>,
) -> ApiResult<Form> {
    if files.is_empty() {
        return Err(ApiError::local("No files to upload"));
    }

    let mut lengths = Vec::with_capacity(files.len());
    for file in &files {
        lengths.push(file.len().await?);
    }
    let total: u64 = lengths.iter().sum();
    let tracker: SharedTracker =
        progress.map(|callback| Arc::new(Mutex::new(ProgressTracker::new(total, callback))));

    let mut form = Form::new();
    for (file, len) in files.into_iter().zip(lengths) {
        let body = match file.source {
            Source::Path(path) => {
                let handle = tokio::fs::File::open(&path).await.map_err(|err| {
                    ApiError::local(format!("Failed to open {}: {err}", path.display()))
                })?;
                reqwest::Body::wrap_stream(track(ReaderStream::new(handle), tracker.clone()))
            }
            Source::Bytes(bytes) => {
                reqwest::Body::wrap_stream(track(stream::iter(chunked(bytes)), tracker.clone()))
            }
        };

        let part = Part::stream_with_length(body, len)
            .file_name(file.file_name)
            .mime_str(&file.mime)
            .map_err(|err| ApiError::local(format!("Invalid MIME type: {err}")))?;
        form = form.part(field.to_string(), part);
    }

    Ok(form)
}
