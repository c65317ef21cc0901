//! Internal stage-to-stage endpoints
//!
//! - `POST /process/stage1` `{insert_id}` queues a full pipeline run
//! - `POST /process/stage2` `{summary, history, insert_id}` runs synthesis
//!   and the result sink from a summary produced elsewhere
//!
//! Both answer 202 once the work is accepted; outcomes are recorded on the
//! submission.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use testimony_agent::{DocumentId, SerializedTurn, Submission, SubmissionStore};

use crate::routes::{error_response, json_response};
use crate::server::AppState;
use crate::types::{GatewayError, Result};

#[derive(Debug, Deserialize)]
pub struct Stage1Request {
    #[serde(default)]
    pub insert_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Stage2Request {
    #[serde(default)]
    pub summary: String,
    /// Serialized transcript: `[{"type": "human" | "ai", "content": "..."}]`
    #[serde(default)]
    pub history: Vec<SerializedTurn>,
    #[serde(default)]
    pub insert_id: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub message: &'static str,
    pub insert_id: DocumentId,
}

/// Handle `POST /process/stage1`
pub async fn handle_stage1(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    match stage1(&state, &body).await {
        Ok(response) => json_response(StatusCode::ACCEPTED, &response),
        Err(e) => error_response(e),
    }
}

/// Handle `POST /process/stage2`
pub async fn handle_stage2(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    match stage2(&state, &body).await {
        Ok(response) => json_response(StatusCode::ACCEPTED, &response),
        Err(e) => error_response(e),
    }
}

async fn stage1(state: &AppState, body: &[u8]) -> Result<AcceptedResponse> {
    let request: Stage1Request = serde_json::from_slice(body)?;
    let submission = load(state, &request.insert_id).await?;

    state.worker.dispatch(submission.document_id.clone()).await?;
    info!(
        submission_id = %submission.submission_id,
        document_id = %submission.document_id,
        "pipeline run queued"
    );

    Ok(AcceptedResponse {
        message: "Pipeline run queued",
        insert_id: submission.document_id,
    })
}

async fn stage2(state: &AppState, body: &[u8]) -> Result<AcceptedResponse> {
    let request: Stage2Request = serde_json::from_slice(body)?;
    if request.summary.trim().is_empty() {
        return Err(GatewayError::BadRequest("missing required field: summary".into()));
    }
    let submission = load(state, &request.insert_id).await?;

    if state
        .pipeline
        .run_guard()
        .is_running(&submission.submission_id)
    {
        return Err(GatewayError::Conflict(format!(
            "pipeline already running for submission {}",
            submission.submission_id
        )));
    }

    let pipeline = Arc::clone(&state.pipeline);
    let document_id = submission.document_id.clone();
    tokio::spawn(async move {
        match pipeline
            .resume_from_summary(&document_id, request.summary, &request.history)
            .await
        {
            Ok(report) => info!(
                document_id = %document_id,
                completion = ?report.completion,
                "synthesis from summary finished"
            ),
            Err(e) => warn!(document_id = %document_id, error = %e, "synthesis from summary failed"),
        }
    });

    Ok(AcceptedResponse {
        message: "Synthesis queued",
        insert_id: submission.document_id,
    })
}

async fn load(state: &AppState, insert_id: &str) -> Result<Submission> {
    let insert_id = insert_id.trim();
    if insert_id.is_empty() {
        return Err(GatewayError::BadRequest("missing required field: insert_id".into()));
    }
    Ok(state
        .pipeline
        .store()
        .load_submission(&DocumentId::new(insert_id))
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use testimony_agent::backend::MockBackend;
    use testimony_agent::{NewSubmission, SubmissionStatus, SurveyAnswers};

    async fn stored(store: &testimony_agent::MemoryStore, submission_id: &str) -> DocumentId {
        let mut answers = SurveyAnswers::default();
        answers.insert(RATING_Q, "Easy");
        store
            .insert_submission(NewSubmission {
                submission_id: submission_id.into(),
                form_id: "form-1".into(),
                webhook_url: "https://hooks.example/form-1".into(),
                contact: "a@b.com".into(),
                answers,
            })
            .await
            .unwrap()
            .document_id
    }

    #[tokio::test]
    async fn test_stage1_queues_run() {
        let (state, store) = state(Arc::new(MockBackend::default()));
        let id = stored(&store, "s-1").await;

        let body = serde_json::json!({ "insert_id": id }).to_string();
        let response = handle_stage1(state, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let completed = eventually(|| {
            let store = store.clone();
            let id = id.clone();
            async move {
                store.load_submission(&id).await.unwrap().status == SubmissionStatus::Completed
            }
        })
        .await;
        assert!(completed);
    }

    #[tokio::test]
    async fn test_stage1_unknown_document_is_not_found() {
        let (state, _) = state(Arc::new(MockBackend::default()));
        let body = serde_json::json!({ "insert_id": "missing" }).to_string();

        let response = handle_stage1(state, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stage1_rejects_invalid_json() {
        let (state, _) = state(Arc::new(MockBackend::default()));
        let response = handle_stage1(state, Bytes::from_static(b"{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stage2_synthesizes_from_given_summary() {
        let backend = Arc::new(MockBackend::default().with_response("A fine testimonial."));
        let (state, store) = state(backend.clone());
        let id = stored(&store, "s-2").await;

        let body = serde_json::json!({
            "summary": "Customer found onboarding easy.",
            "history": [
                {"type": "human", "content": "Survey response = ..."},
                {"type": "ai", "content": "Thanks."}
            ],
            "insert_id": id,
        })
        .to_string();
        let response = handle_stage2(state, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let saved = eventually(|| {
            let store = store.clone();
            async move { store.load_testimonials("s-2").await.unwrap().is_some() }
        })
        .await;
        assert!(saved);

        let set = store.load_testimonials("s-2").await.unwrap().unwrap();
        assert_eq!(set.summary, "Customer found onboarding easy.");
        assert_eq!(set.context.len(), 2);
        // Only the three synthesis calls; no stage chain
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stage2_requires_summary() {
        let (state, store) = state(Arc::new(MockBackend::default()));
        let id = stored(&store, "s-3").await;

        let body = serde_json::json!({ "summary": " ", "history": [], "insert_id": id }).to_string();
        let response = handle_stage2(state, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
