//! Survey webhook intake
//!
//! `POST /submit-form` takes the form builder's urlencoded payload, stores
//! the parsed submission and queues its pipeline run. The caller only learns
//! whether the submission was stored, never how generation went.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use testimony_agent::{DocumentId, SubmissionForm};

use crate::routes::{error_response, json_response};
use crate::server::AppState;
use crate::types::Result;

pub const SUBMIT_OK_MESSAGE: &str = "Data received and parsed successfully!";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: &'static str,
    pub insert_id: DocumentId,
}

/// Handle `POST /submit-form`
pub async fn handle_submit(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    match submit(&state, &body).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => {
            warn!(error = %e, "submission rejected");
            error_response(e)
        }
    }
}

async fn submit(state: &AppState, body: &[u8]) -> Result<SubmitResponse> {
    let form: SubmissionForm = serde_urlencoded::from_bytes(body)?;
    let submission = state.pipeline.ingest(&form).await?;

    // Left pending on failure; the startup recovery sweep picks it up
    if let Err(e) = state.worker.dispatch(submission.document_id.clone()).await {
        warn!(
            document_id = %submission.document_id,
            error = %e,
            "could not queue pipeline run"
        );
    } else {
        info!(
            submission_id = %submission.submission_id,
            document_id = %submission.document_id,
            "pipeline run queued"
        );
    }

    Ok(SubmitResponse {
        message: SUBMIT_OK_MESSAGE,
        insert_id: submission.document_id,
    })
}
