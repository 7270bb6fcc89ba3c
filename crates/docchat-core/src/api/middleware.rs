//! Request/response hooks run around every API call.
//!
//! The client owns an ordered list of [`Middleware`]. `before` runs in order
//! on the outgoing request; `after` runs in the same order once the outcome
//! is known, whether the call succeeded or not.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::logging::mask_token;
use crate::session::SessionStore;

/// Route the login screen lives at.
pub const LOGIN_PATH: &str = "/login";

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Mutable view of an outgoing request.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    /// Path relative to the base URL, without query.
    pub path: String,
    pub headers: HeaderMap,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// How a request ended.
#[derive(Debug)]
pub enum Outcome<'a> {
    /// A response arrived. `body` is empty for streamed downloads.
    Response { status: StatusCode, body: &'a [u8] },
    /// The request was dispatched but nothing came back.
    NoResponse { error: &'a reqwest::Error },
    /// The request never left the client.
    Local { message: &'a str },
}

impl Outcome<'_> {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Outcome::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub trait Middleware: Send + Sync {
    fn before(&self, _ctx: &mut RequestContext) {}

    fn after(&self, _ctx: &RequestContext, _outcome: &Outcome<'_>) {}
}

/// Navigation hook invoked when the server rejects the session.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

impl<F> LoginRedirect for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Default redirect: logs that a login is required.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self) {
        tracing::warn!(target_path = LOGIN_PATH, "Session expired; login required");
    }
}

/// Client-local token set imperatively on the client.
///
/// Each override remembers the session's auth generation at the time it was
/// set. It is only honored while that generation is current, so whichever of
/// the override and the session was written last supplies the bearer.
#[derive(Debug, Default)]
pub struct TokenOverride {
    token: RwLock<Option<(String, u64)>>,
}

impl TokenOverride {
    /// The override regardless of staleness.
    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(token, _)| token.clone()))
    }

    /// The override, if nothing wrote the session since `generation`.
    pub fn current(&self, generation: u64) -> Option<String> {
        self.token.read().ok().and_then(|guard| {
            guard
                .as_ref()
                .filter(|(_, set_at)| *set_at == generation)
                .map(|(token, _)| token.clone())
        })
    }

    pub fn set(&self, token: impl Into<String>, generation: u64) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some((token.into(), generation));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }
}

/// Attaches `Authorization: Bearer <token>` when a token is available.
pub struct AuthHeader {
    session: Arc<SessionStore>,
    token: Arc<TokenOverride>,
}

impl AuthHeader {
    pub fn new(session: Arc<SessionStore>, token: Arc<TokenOverride>) -> Self {
        Self { session, token }
    }
}

impl Middleware for AuthHeader {
    fn before(&self, ctx: &mut RequestContext) {
        let generation = self.session.auth_generation();
        let Some(token) = self
            .token
            .current(generation)
            .or_else(|| self.session.token())
        else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                ctx.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!(
                token = %mask_token(&token),
                "Token is not a valid header value; sending request without it"
            ),
        }
    }
}

/// Tags each request with an id and logs method, path, status and timing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestTiming;

impl Middleware for RequestTiming {
    fn before(&self, ctx: &mut RequestContext) {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            ctx.headers
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        ctx.started = Instant::now();
        tracing::debug!(
            method = %ctx.method,
            path = %ctx.path,
            request_id = %id,
            "API request"
        );
    }

    fn after(&self, ctx: &RequestContext, outcome: &Outcome<'_>) {
        let elapsed_ms = ctx.elapsed_ms();
        let request_id = ctx.request_id().unwrap_or("-");
        match outcome {
            Outcome::Response { status, .. } if status.is_success() => tracing::debug!(
                method = %ctx.method,
                path = %ctx.path,
                status = status.as_u16(),
                elapsed_ms,
                request_id,
                "API response"
            ),
            Outcome::Response { status, .. } => tracing::debug!(
                method = %ctx.method,
                path = %ctx.path,
                status = status.as_u16(),
                elapsed_ms,
                request_id,
                "API error response"
            ),
            Outcome::NoResponse { error } => tracing::debug!(
                method = %ctx.method,
                path = %ctx.path,
                elapsed_ms,
                request_id,
                error = %error,
                "API request got no response"
            ),
            Outcome::Local { message } => tracing::debug!(
                method = %ctx.method,
                path = %ctx.path,
                request_id,
                error = %message,
                "API request failed before dispatch"
            ),
        }
    }
}

/// Clears the session and redirects to login when the server answers 401.
pub struct SessionGuard {
    session: Arc<SessionStore>,
    token: Arc<TokenOverride>,
    redirect: Arc<dyn LoginRedirect>,
}

impl SessionGuard {
    pub fn new(
        session: Arc<SessionStore>,
        token: Arc<TokenOverride>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            session,
            token,
            redirect,
        }
    }
}

impl Middleware for SessionGuard {
    fn after(&self, ctx: &RequestContext, outcome: &Outcome<'_>) {
        if outcome.status() != Some(StatusCode::UNAUTHORIZED) {
            return;
        }
        tracing::info!(path = %ctx.path, "Server rejected credentials; clearing session");
        self.token.clear();
        if let Err(err) = self.session.clear_auth() {
            tracing::warn!(error = %format!("{err:#}"), "Failed to clear persisted session");
        }
        self.redirect.redirect_to_login();
    }
}

/// Logs forbidden and server-side failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureLog;

impl Middleware for FailureLog {
    fn after(&self, ctx: &RequestContext, outcome: &Outcome<'_>) {
        let Some(status) = outcome.status() else {
            return;
        };
        if status == StatusCode::FORBIDDEN {
            tracing::warn!(path = %ctx.path, "Access forbidden");
        } else if status.is_server_error() {
            tracing::error!(path = %ctx.path, status = status.as_u16(), "Server error");
        }
    }
}
