//! HTTP submission endpoint (axum).
//!
//! ```rust,ignore
//! use hermes::api::submission_router;
//!
//! let app = Router::new().nest("/v1", submission_router(submitter));
//! ```
//!
//! `POST /messages` takes the email JSON and answers `202 Accepted` with the
//! receipt. Failures are `application/problem+json` documents.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::submission::{SubmitError, Submitter};

/// Create the submission router.
pub fn submission_router(submitter: Submitter) -> Router {
    Router::new()
        .route("/messages", post(submit_message))
        .with_state(submitter)
}

/// POST /messages - Admit an email into the pipeline.
async fn submit_message(State(submitter): State<Submitter>, body: Bytes) -> Response {
    let result = match std::str::from_utf8(&body) {
        Ok(json) => submitter.submit_json(json).await,
        Err(_) => Err(SubmitError::Invalid("request body is not UTF-8".into())),
    };

    match result {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(e) => problem_response(&e),
    }
}

fn problem_response(err: &SubmitError) -> Response {
    let problem = err.problem();
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_string(&problem).unwrap_or_default();
    (
        status,
        [(header::CONTENT_TYPE, "application/problem+json")],
        body,
    )
        .into_response()
}
