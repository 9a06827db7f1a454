//! HTTP surface: routes, handlers, and the `run` entry point.
//!
//! | Route | Success | Failure |
//! |-------|---------|---------|
//! | `POST /api/interpretar-cupom` (multipart `image`) | 202 `{jobId}` | 400, 413, 503 |
//! | `POST /api/interpretar-cupom-texto` (JSON `{text}`) | 202 `{jobId}` | 400, 413, 503 |
//! | `GET /api/status?jobId=…` | 200 `{status:"done", data}` | 202 processing, 404, 500 `{status:"error", error}` |
//! | `GET /health` | 200 `{status:"ok", jobs}` | |

use crate::config::ServiceConfig;
use crate::error::{CupomError, SubmissionError};
use crate::ingest::IngestionGateway;
use crate::job::JobId;
use crate::pipeline::extractor::LlmExtractor;
use crate::registry::{JobCounts, JobRegistry};
use crate::status::{get_status, JobView};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Multipart field names accepted for the receipt image.
pub const IMAGE_FIELDS: [&str; 2] = ["image", "imagem"];

#[derive(Clone)]
pub struct AppState {
    pub gateway: IngestionGateway,
}

impl AppState {
    pub fn new(gateway: IngestionGateway) -> Self {
        Self { gateway }
    }

    fn registry(&self) -> &JobRegistry {
        self.gateway.registry()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub jobs: JobCounts,
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/interpretar-cupom", post(submit_image_handler))
        .route("/api/interpretar-cupom-texto", post(submit_text_handler))
        .route("/api/status", get(status_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(trace_layer)
        .with_state(state)
}

/// Start the extractor, the worker pool and the HTTP server; serve until Ctrl-C.
///
/// Fails fast when the extractor credential is missing.
pub async fn run(config: ServiceConfig) -> Result<(), CupomError> {
    config.require_credential()?;
    let extractor = LlmExtractor::from_config(&config)?;

    let (gateway, _dispatcher) =
        IngestionGateway::start(JobRegistry::new(), Arc::new(extractor), &config);
    let router = create_router(AppState::new(gateway), config.max_upload_bytes);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| CupomError::Bind {
            addr: config.bind_addr.to_string(),
            source,
        })?;
    info!(
        addr = %config.bind_addr,
        workers = config.workers,
        queue_capacity = config.queue_capacity,
        "Listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(CupomError::Serve)?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        jobs: state.registry().counts(),
    })
}

#[tracing::instrument(skip(state, multipart))]
async fn submit_image_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read multipart");
                return error_response(e.status(), e.body_text());
            }
        };

        if !field.name().is_some_and(|n| IMAGE_FIELDS.contains(&n)) {
            continue;
        }

        let filename = field.file_name().map(str::to_owned);
        let declared = field.content_type().map(str::to_owned);
        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Failed to read uploaded image");
                return error_response(e.status(), e.body_text());
            }
        };

        return accepted_or_rejected(state.gateway.submit_image(
            &bytes,
            filename.as_deref(),
            declared.as_deref(),
        ));
    }

    accepted_or_rejected(Err(SubmissionError::MissingImage))
}

#[tracing::instrument(skip(state, payload))]
async fn submit_text_handler(
    State(state): State<AppState>,
    payload: Result<Json<SubmitTextRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(r)) => r,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return error_response(rejection.status(), rejection.body_text());
        }
        Err(rejection) => {
            return accepted_or_rejected(Err(SubmissionError::MalformedBody(
                rejection.body_text(),
            )));
        }
    };
    accepted_or_rejected(state.gateway.submit_text(request.text.as_deref()))
}

#[tracing::instrument(skip(state))]
async fn status_handler(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    let Some(job_id) = query.job_id else {
        return accepted_or_rejected(Err(SubmissionError::MissingField("jobId")));
    };
    get_status(state.registry(), &job_id).into_response()
}

// ── Responses ────────────────────────────────────────────────────────────────

impl IntoResponse for JobView {
    fn into_response(self) -> Response {
        match self {
            JobView::NotFound => error_response(StatusCode::NOT_FOUND, "Unknown jobId".into()),
            JobView::Processing => {
                (StatusCode::ACCEPTED, Json(json!({ "status": "processing" }))).into_response()
            }
            JobView::Done(receipt) => (
                StatusCode::OK,
                Json(json!({ "status": "done", "data": receipt })),
            )
                .into_response(),
            JobView::Failed(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": detail })),
            )
                .into_response(),
        }
    }
}

/// HTTP status for a rejected submission.
pub fn submission_status(err: &SubmissionError) -> StatusCode {
    match err {
        SubmissionError::QueueFull | SubmissionError::WorkersUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SubmissionError::MissingImage
        | SubmissionError::UnknownMediaType
        | SubmissionError::UnsupportedMediaType { .. }
        | SubmissionError::MissingField(_)
        | SubmissionError::MalformedBody(_) => StatusCode::BAD_REQUEST,
    }
}

fn accepted_or_rejected(result: Result<JobId, SubmissionError>) -> Response {
    match result {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                job_id: job_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Submission rejected");
            error_response(submission_status(&e), e.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
