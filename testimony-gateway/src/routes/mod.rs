//! HTTP routes for the gateway

pub mod health;
pub mod process;
pub mod submit;

pub use health::{health_check, readiness_check, version_info};
pub use process::{handle_stage1, handle_stage2};
pub use submit::handle_submit;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::GatewayError;

/// JSON response with CORS header
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error response carrying the gateway error's status
pub(crate) fn error_response(err: GatewayError) -> Response<Full<Bytes>> {
    let (status, message) = err.into_status_code_and_body();
    json_response(
        status,
        &serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message
        }),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use clap::Parser;
    use http_body_util::BodyExt;
    use testimony_agent::backend::MockBackend;
    use testimony_agent::{
        Generator, GeneratorConfig, LogNotifier, MemoryStore, Pipeline, PipelineConfig,
        PipelineWorker, QuestionCatalog, WorkerConfig,
    };

    use super::*;
    use crate::config::Args;
    use crate::server::AppState;

    pub const EMAIL_Q: &str = "Please Enter your Email Address";
    pub const RATING_Q: &str = "How easy was onboarding?";

    pub fn catalog() -> QuestionCatalog {
        QuestionCatalog::from_texts([EMAIL_Q, RATING_Q]).unwrap()
    }

    pub fn blob(email: &str, rating: &str) -> String {
        format!("{}: {}, {}: {}", EMAIL_Q, email, RATING_Q, rating)
    }

    /// Dev-mode state over a memory store and a mock backend
    pub fn state(backend: Arc<MockBackend>) -> (Arc<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(catalog()),
            store.clone(),
            Arc::new(LogNotifier),
            Generator::new(backend.clone(), GeneratorConfig::stage()),
            Generator::new(backend, GeneratorConfig::synthesis()),
            PipelineConfig {
                sentiment_enabled: false,
                ..PipelineConfig::default()
            },
        ));
        let worker = Arc::new(PipelineWorker::start(
            Arc::clone(&pipeline),
            WorkerConfig {
                retry_backoff: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        ));
        let args = Args::try_parse_from(["testimony-gateway", "--dev-mode"]).unwrap();
        (Arc::new(AppState::new(args, pipeline, worker)), store)
    }

    pub async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Poll until `check` passes or a second has gone by
    pub async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
