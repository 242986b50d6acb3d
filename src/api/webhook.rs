//! Hook endpoint delivering push notifications to the build pipeline

use axum::{body::Bytes, extract::State as AxumState, http::StatusCode};
use tracing::{error, info};

use crate::SharedState;
use crate::pipeline::{Outcome, RejectReason};

/// Map a pipeline outcome onto the response status. The body is always the
/// canonical status phrase; diagnostics never travel back to the caller.
pub fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Submitted => StatusCode::OK,
        Outcome::Rejected(RejectReason::UpstreamUnavailable) => StatusCode::BAD_GATEWAY,
        Outcome::Rejected(_) => StatusCode::BAD_REQUEST,
        Outcome::Failed(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handles the Gogs post-receive hook POST request.
pub async fn handle_hook(
    AxumState(state): AxumState<SharedState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let outcome = state.pipeline.handle(&body).await;

    match &outcome {
        Outcome::Submitted => info!("Build task submitted"),
        Outcome::Rejected(reason) => info!(?reason, "Notification rejected"),
        Outcome::Failed(stage, e) => error!(?stage, "Pipeline failed: {}", e),
    }

    let code = status_for(&outcome);
    (code, code.canonical_reason().unwrap_or(""))
}
