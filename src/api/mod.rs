//! HTTP handlers

pub mod webhook;

pub use webhook::handle_hook;

/// GET / - liveness probe
pub async fn root() -> &'static str {
    "gogs_ci_hook"
}
