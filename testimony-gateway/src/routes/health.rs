//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (can the store be reached?)
//! - /version - Build information

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use testimony_agent::SubmissionStore;

use crate::routes::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the gateway started
    pub uptime: u64,
    pub timestamp: String,
    /// `development` (in-memory store) or `production`
    pub mode: &'static str,
    pub worker: WorkerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pipeline worker load
#[derive(Serialize)]
pub struct WorkerHealth {
    pub active: usize,
    pub concurrency: usize,
    pub queue_capacity: usize,
    /// Submissions with a run in flight
    pub in_flight: usize,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: error.is_none(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        worker: WorkerHealth {
            active: state.worker.active(),
            concurrency: state.worker.concurrency(),
            queue_capacity: state.worker.queue_capacity(),
            in_flight: state.pipeline.run_guard().in_flight_count(),
        },
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
///
/// Always 200 while the process is serving requests.
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(&state, None))
}

/// Handle readiness probe (/ready, /readyz)
///
/// 503 when the submission store does not answer a ping.
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let error = state
        .pipeline
        .store()
        .ping()
        .await
        .err()
        .map(|e| format!("Store unreachable: {}", e));

    let status = if error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(status, &build_health_response(&state, error))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        service: "testimony-gateway",
    };

    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use testimony_agent::backend::MockBackend;

    #[tokio::test]
    async fn test_health_reports_worker_and_mode() {
        let (state, _) = state(Arc::new(MockBackend::default()));

        let response = health_check(state);
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["healthy"], true);
        assert_eq!(json["mode"], "development");
        assert_eq!(json["worker"]["concurrency"], 4);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_ready_when_store_answers() {
        let (state, _) = state(Arc::new(MockBackend::default()));
        let response = readiness_check(state).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_version_names_service() {
        let json = body_json(version_info()).await;
        assert_eq!(json["service"], "testimony-gateway");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
