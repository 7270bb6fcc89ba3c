//! Client core for the document chatbot service.
//!
//! - [`session`]: the authenticated session, persisted write-through.
//! - [`api`]: HTTP gateway with middleware, upload/download, and typed
//!   endpoint groups.
//! - [`config`]: `config.toml` plus environment overrides.
//! - [`logging`]: tracing setup.

pub mod api;
pub mod config;
pub mod logging;
pub mod session;
