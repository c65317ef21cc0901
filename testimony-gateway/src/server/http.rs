//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one spawned task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use testimony_agent::{Pipeline, PipelineWorker};

use crate::config::Args;
use crate::routes;
use crate::types::GatewayError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Extraction, stage chain, synthesis and sink over the configured store
    pub pipeline: Arc<Pipeline>,
    /// Background queue that runs the pipeline per submission
    pub worker: Arc<PipelineWorker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, pipeline: Arc<Pipeline>, worker: Arc<PipelineWorker>) -> Self {
        Self {
            args,
            pipeline,
            worker,
            started_at: Instant::now(),
        }
    }
}

/// Accept connections until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Testimony gateway listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - submissions are kept in memory");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)))
        }

        // Readiness probe - 200 only if the store answers
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            to_boxed(routes::readiness_check(Arc::clone(&state)).await)
        }

        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // Survey webhook (form-urlencoded)
        (Method::POST, "/submit-form") => match read_body(req).await {
            Ok(body) => to_boxed(routes::handle_submit(Arc::clone(&state), body).await),
            Err(response) => to_boxed(response),
        },

        (Method::POST, "/process/stage1") => match read_body(req).await {
            Ok(body) => to_boxed(routes::handle_stage1(Arc::clone(&state), body).await),
            Err(response) => to_boxed(response),
        },

        (Method::POST, "/process/stage2") => match read_body(req).await {
            Ok(body) => to_boxed(routes::handle_stage2(Arc::clone(&state), body).await),
            Err(response) => to_boxed(response),
        },

        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        _ => to_boxed(not_found_response(&path)),
    };

    debug!(status = %response.status(), path = %path, "request handled");
    Ok(response)
}

/// Read the whole request body
async fn read_body(req: Request<Incoming>) -> Result<Bytes, Response<Full<Bytes>>> {
    match req.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            warn!("Request body error: {}", e);
            Err(bad_request_response("Failed to read request body"))
        }
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
        "hint": "POST /submit-form, /process/stage1 or /process/stage2"
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Bad request response
fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Bad Request",
        "message": message
    });

    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_names_path() {
        let response = not_found_response("/nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["path"], "/nope");
    }

    #[test]
    fn test_preflight_allows_post() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::OK);
        let methods = response.headers()["Access-Control-Allow-Methods"]
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
    }
}
