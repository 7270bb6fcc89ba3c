//! HTTP gateway to the chatbot backend.
//!
//! `ApiClient` owns one `reqwest::Client`, a base URL, and an ordered
//! middleware stack. Every call goes through the same pipeline:
//!
//! 1. `before` hooks (bearer token, request id)
//! 2. dispatch
//! 3. `after` hooks (timing, 401 session reset, failure logging)
//! 4. normalization into [`Envelope`] or [`ApiError`]
//!
//! Endpoint groups ([`AuthApi`], [`ChatbotsApi`]) are thin typed wrappers
//! over the generic verbs.

mod auth;
mod chatbots;
mod envelope;
mod error;
pub mod middleware;
mod upload;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

pub use auth::AuthApi;
pub use chatbots::ChatbotsApi;
pub use envelope::{Envelope, PageMeta};
pub use error::{
    ApiError, ApiErrorKind, ApiResult, NETWORK_ERROR_MESSAGE, SERVER_ERROR_MESSAGE,
    UNEXPECTED_ERROR_MESSAGE,
};
pub use middleware::{
    AuthHeader, FailureLog, LOGIN_PATH, LogRedirect, LoginRedirect, Middleware, Outcome,
    RequestContext, RequestTiming, SessionGuard, TokenOverride,
};
pub use upload::{ProgressFn, ProgressTracker, UploadFile, mime_for_path, percent};

use crate::config::{self, Config};
use crate::session::SessionStore;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("docchat/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Filename used for downloads when the caller supplies none.
pub const DEFAULT_DOWNLOAD_NAME: &str = "download";

enum RequestBody {
    None,
    Json(Value),
    Multipart {
        field: String,
        files: Vec<upload::UploadFile>,
    },
}

/// A request before it enters the pipeline.
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
    progress: Option<ProgressFn>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::None,
            progress: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Serializes `body` as the JSON payload.
    ///
    /// # Errors
    /// Returns a local error if `body` cannot be represented as JSON.
    pub fn json_body<B: Serialize + ?Sized>(self, body: &B) -> ApiResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::local(format!("Failed to encode request body: {err}")))?;
        Ok(self.json(value))
    }

    pub fn multipart(mut self, field: impl Into<String>, files: Vec<UploadFile>) -> Self {
        self.body = RequestBody::Multipart {
            field: field.into(),
            files,
        };
        self
    }

    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct ApiClientBuilder {
    session: Arc<SessionStore>,
    base_url: Option<String>,
    timeout: Duration,
    redirect: Arc<dyn LoginRedirect>,
    extra: Vec<Arc<dyn Middleware>>,
}

impl ApiClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL from `config`, honoring `DOCCHAT_API_URL`.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is invalid.
    pub fn config(mut self, config: &Config) -> Result<Self> {
        self.base_url = Some(config.api_base_url()?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn login_redirect(mut self, redirect: impl LoginRedirect + 'static) -> Self {
        self.redirect = Arc::new(redirect);
        self
    }

    /// Appends a middleware after the built-in stack.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.extra.push(Arc::new(middleware));
        self
    }

    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<ApiClient> {
        let base_url = match self.base_url {
            Some(url) => config::resolve_base_url(Some(url.as_str()), None)?,
            None => {
                let env_url = std::env::var(config::API_URL_ENV).ok();
                config::resolve_base_url(env_url.as_deref(), None)?
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        let token = Arc::new(TokenOverride::default());
        let mut middleware: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(AuthHeader::new(Arc::clone(&self.session), Arc::clone(&token))),
            Arc::new(RequestTiming),
            Arc::new(SessionGuard::new(
                Arc::clone(&self.session),
                Arc::clone(&token),
                self.redirect,
            )),
            Arc::new(FailureLog),
        ];
        middleware.extend(self.extra);

        Ok(ApiClient {
            http,
            base_url: RwLock::new(base_url),
            session: self.session,
            token,
            middleware,
        })
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: RwLock<String>,
    session: Arc<SessionStore>,
    token: Arc<TokenOverride>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ApiClient {
    pub fn builder(session: Arc<SessionStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            session,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            redirect: Arc::new(LogRedirect),
            extra: Vec::new(),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .map(|url| url.clone())
            .unwrap_or_default()
    }

    /// Points subsequent requests at a different server.
    ///
    /// # Errors
    /// Returns an error if `url` is not a valid http(s) URL.
    pub fn set_base_url(&self, url: &str) -> Result<()> {
        let url = config::resolve_base_url(Some(url), None)?;
        let mut guard = self
            .base_url
            .write()
            .map_err(|_| anyhow::anyhow!("base URL lock poisoned"))?;
        *guard = url;
        Ok(())
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Sends `token` instead of the session token until it is cleared or the
    /// session is written again (login, logout, 401).
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.token.set(token, self.session.auth_generation());
    }

    /// Drops the local override; requests fall back to the session token.
    pub fn clear_auth_token(&self) {
        self.token.clear();
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn chatbots(&self) -> ChatbotsApi<'_> {
        ChatbotsApi::new(self)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Envelope<T>> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Envelope<T>> {
        self.request(ApiRequest::delete(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ApiResult<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(path).json_body(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ApiResult<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(path).json_body(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ApiResult<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::patch(path).json_body(body)?).await
    }

    /// Uploads one file under the `file` field.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file: UploadFile,
        progress: Option<ProgressFn>,
    ) -> ApiResult<Envelope<T>> {
        self.upload_multiple(path, vec![file], Some("file"), progress)
            .await
    }

    /// Uploads several files under `field` (default `files`).
    pub async fn upload_multiple<T: DeserializeOwned>(
        &self,
        path: &str,
        files: Vec<UploadFile>,
        field: Option<&str>,
        progress: Option<ProgressFn>,
    ) -> ApiResult<Envelope<T>> {
        let mut request = ApiRequest::post(path).multipart(field.unwrap_or("files"), files);
        if let Some(progress) = progress {
            request = request.on_progress(progress);
        }
        self.request(request).await
    }

    /// Runs `request` through the pipeline and decodes the envelope.
    ///
    /// # Errors
    /// Returns a normalized [`ApiError`] for every failure mode.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<Envelope<T>> {
        let (ctx, response) = self.send(request).await?;
        let status = response.status();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                self.finish(&ctx, &Outcome::NoResponse { error: &err });
                return Err(ApiError::network());
            }
        };
        self.finish(&ctx, &Outcome::Response { status, body: &body });

        decode_envelope(&ctx.path, status, &body)
    }

    /// Streams a binary response into `dir`, returning the written path.
    ///
    /// # Errors
    /// Returns an API error for HTTP failures, or a local error if the file
    /// cannot be written.
    pub async fn download(
        &self,
        request: ApiRequest,
        dir: &Path,
        filename: Option<&str>,
    ) -> ApiResult<PathBuf> {
        let target = dir.join(safe_file_name(filename));
        let (ctx, response) = self.send(request).await?;
        let status = response.status();

        match write_stream(response, dir, &target).await {
            Ok(()) => {
                self.finish(&ctx, &Outcome::Response { status, body: &[] });
                tracing::info!(path = %target.display(), "Downloaded file");
                Ok(target)
            }
            Err(DownloadError::Network(err)) => {
                self.finish(&ctx, &Outcome::NoResponse { error: &err });
                Err(ApiError::network())
            }
            Err(DownloadError::Local(message)) => {
                self.finish(&ctx, &Outcome::Local { message: &message });
                Err(ApiError::local(message))
            }
        }
    }

    /// Whether `GET /health` answers with a success status.
    pub async fn health_check(&self) -> bool {
        match self.send(ApiRequest::get("/health")).await {
            Ok((ctx, response)) => {
                let status = response.status();
                self.finish(&ctx, &Outcome::Response { status, body: &[] });
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "Health check failed");
                false
            }
        }
    }

    /// Runs `before` hooks, dispatches, and handles non-success statuses.
    ///
    /// On success the caller owns the body and must call [`Self::finish`]
    /// once it has been consumed.
    async fn send(&self, request: ApiRequest) -> ApiResult<(RequestContext, reqwest::Response)> {
        let ApiRequest {
            method,
            path,
            query,
            headers,
            body,
            progress,
        } = request;

        let mut ctx = RequestContext::new(method, path, headers);
        for middleware in &self.middleware {
            middleware.before(&mut ctx);
        }

        let url = join_url(&self.base_url(), &ctx.path);
        let mut builder = self
            .http
            .request(ctx.method.clone(), url)
            .headers(ctx.headers.clone());
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        builder = match body {
            RequestBody::None => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart { field, files } => {
                match upload::build_form(&field, files, progress).await {
                    // Sets the boundary content type, so the JSON default is skipped.
                    Ok(form) => builder.multipart(form),
                    Err(err) => {
                        self.finish(&ctx, &Outcome::Local { message: &err.message });
                        return Err(err);
                    }
                }
            }
        };

        let request = match builder.build() {
            Ok(request) => request,
            Err(err) => {
                let message = err.to_string();
                self.finish(&ctx, &Outcome::Local { message: &message });
                return Err(ApiError::local(message));
            }
        };

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                self.finish(&ctx, &Outcome::NoResponse { error: &err });
                return Err(ApiError::network());
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok((ctx, response));
        }

        let body = response.bytes().await.unwrap_or_default();
        self.finish(&ctx, &Outcome::Response { status, body: &body });
        Err(ApiError::from_response(status.as_u16(), &body))
    }

    fn finish(&self, ctx: &RequestContext, outcome: &Outcome<'_>) {
        for middleware in &self.middleware {
            middleware.after(ctx, outcome);
        }
    }
}

/// Percent-encodes an id for use as one path segment.
pub(crate) fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn decode_envelope<T: DeserializeOwned>(
    path: &str,
    status: StatusCode,
    body: &[u8],
) -> ApiResult<Envelope<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Envelope::empty());
    }

    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|err| {
        ApiError::decode(format!("Malformed response from {path}: {err}"))
    })?;

    if !envelope.success {
        return Err(ApiError::rejected(
            status.as_u16(),
            envelope.error.as_ref(),
            envelope.message.as_deref(),
        ));
    }
    Ok(envelope)
}

fn safe_file_name(filename: Option<&str>) -> String {
    filename
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}

enum DownloadError {
    Network(reqwest::Error),
    Local(String),
}

/// `<target>.part`, next to `target`.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

async fn write_stream(
    response: reqwest::Response,
    dir: &Path,
    target: &Path,
) -> Result<(), DownloadError> {
    tokio::fs::create_dir_all(dir).await.map_err(|err| {
        DownloadError::Local(format!("Failed to create directory {}: {err}", dir.display()))
    })?;

    let tmp_path = partial_path(target);
    let result = match write_partial(response, &tmp_path).await {
        Ok(()) => tokio::fs::rename(&tmp_path, target).await.map_err(|err| {
            DownloadError::Local(format!(
                "Failed to rename {} to {}: {err}",
                tmp_path.display(),
                target.display()
            ))
        }),
        Err(err) => Err(err),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_partial(response: reqwest::Response, tmp_path: &Path) -> Result<(), DownloadError> {
    let mut file = tokio::fs::File::create(tmp_path).await.map_err(|err| {
        DownloadError::Local(format!("Failed to create {}: {err}", tmp_path.display()))
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DownloadError::Network)?;
        file.write_all(&chunk).await.map_err(|err| {
            DownloadError::Local(format!("Failed to write {}: {err}", tmp_path.display()))
        })?;
    }
    file.flush().await.map_err(|err| {
        DownloadError::Local(format!("Failed to flush {}: {err}", tmp_path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_handles_slashes() {
        assert_eq!(
            join_url("http://localhost:3000/", "/api/chatbots"),
            "http://localhost:3000/api/chatbots"
        );
        assert_eq!(
            join_url("http://localhost:3000", "health"),
            "http://localhost:3000/health"
        );
    }

    #[test]
    fn test_segment_keeps_ids_inside_one_segment() {
        assert_eq!(segment("c42"), "c42");
        assert_eq!(segment("a/b?c#d"), "a%2Fb%3Fc%23d");
        assert_eq!(segment("../admin"), "..%2Fadmin");
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            partial_path(&dir.join("report.csv")),
            dir.join("report.csv.part")
        );
        assert_ne!(
            partial_path(&dir.join("report.csv")),
            partial_path(&dir.join("report.json"))
        );
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("a,b\n"))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("history.csv");
        // A non-empty directory in the way makes the final rename fail.
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), "x").unwrap();

        assert!(write_stream(response, dir.path(), &target).await.is_err());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(safe_file_name(Some("report.csv")), "report.csv");
        assert_eq!(safe_file_name(None), DEFAULT_DOWNLOAD_NAME);
        assert_eq!(safe_file_name(Some("")), DEFAULT_DOWNLOAD_NAME);
    }

    #[test]
    fn test_decode_rejected_envelope() {
        let err = decode_envelope::<Value>(
            "/api/x",
            StatusCode::OK,
            br#"{"success":false,"message":"Quota exceeded"}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "Quota exceeded");
    }

    #[test]
    fn test_decode_rejected_envelope_with_error_object() {
        let err = decode_envelope::<Value>(
            "/api/x",
            StatusCode::OK,
            br#"{"success":false,"error":{"code":"LIMIT","message":"Too many chatbots"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "Too many chatbots");
    }

    #[test]
    fn test_decode_empty_body_is_success() {
        let envelope = decode_envelope::<Value>("/api/x", StatusCode::NO_CONTENT, b"").unwrap();
        assert!(envelope.success);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_decode_malformed_body() {
        let err = decode_envelope::<Value>("/api/x", StatusCode::OK, b"not json").unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Decode);
        assert!(err.message.contains("/api/x"));
    }
}
