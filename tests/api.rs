//! HTTP-level tests for the receipt service.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! extractor is a stub, so these run without network access.
//!
//! The last test makes a live extraction call. It is gated behind
//! `E2E_ENABLED` and needs `GEMINI_API_KEY` plus `test_cases/cupom.jpg`:
//!   E2E_ENABLED=1 cargo test --test api live_ -- --nocapture

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use cupom_fiscal::{
    create_router, AppState, DocumentExtractor, ExtractionPayload, ExtractorError,
    IngestionGateway, JobRegistry, LlmExtractor, ServiceConfig,
};

const BOUNDARY: &str = "cupom-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies with a fixed answer, optionally after a permit is released.
/// Records the media type (or "text") of every payload it sees.
struct StubExtractor {
    reply: Result<String, ExtractorError>,
    gate: Option<Arc<Semaphore>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl StubExtractor {
    fn replying(raw: &str) -> Self {
        Self {
            reply: Ok(raw.to_string()),
            gate: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StubExtractor {
    async fn extract(
        &self,
        _prompt: &str,
        payload: &ExtractionPayload,
    ) -> Result<String, ExtractorError> {
        let kind = match payload {
            ExtractionPayload::Image(img) => img.media_type.clone(),
            ExtractionPayload::Text(_) => "text".to_string(),
        };
        self.seen.lock().unwrap().push(kind);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        self.reply.clone()
    }
}

/// Route service logs to the test harness; set `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn app_with(extractor: impl DocumentExtractor + 'static, config: &ServiceConfig) -> Router {
    init_tracing();
    let (gateway, _) = IngestionGateway::start(JobRegistry::new(), Arc::new(extractor), config);
    create_router(AppState::new(gateway), config.max_upload_bytes)
}

fn app(extractor: impl DocumentExtractor + 'static) -> Router {
    app_with(extractor, &ServiceConfig::default())
}

fn multipart_request(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/interpretar-cupom")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn text_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/interpretar-cupom-texto")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn status_request(job_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/status?jobId={job_id}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

async fn submit(app: &Router, request: Request<Body>) -> String {
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED, "submit failed: {body}");
    body["jobId"].as_str().expect("jobId in body").to_string()
}

/// Poll until the job leaves `processing`.
async fn poll_until_finished(app: &Router, job_id: &str) -> (StatusCode, Value) {
    for _ in 0..400 {
        let (status, body) = send(app, status_request(job_id)).await;
        if status != StatusCode::ACCEPTED {
            return (status, body);
        }
        assert_eq!(body, json!({ "status": "processing" }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never finished");
}

// ── Image submissions ────────────────────────────────────────────────────────

#[tokio::test]
async fn image_receipt_round_trip() {
    let raw = "```json\n{\"categoria\":\"supermercado\",\"razao_social\":\"ASSAI ATACADISTA\",\
               \"total_compra\":45.9,\"lista_de_produtos\":[{\"produto\":\"ARROZ 5KG\",\
               \"quantidade\":1,\"preco_total\":25.9}]}\n```";
    let stub = StubExtractor::replying(raw);
    let seen = Arc::clone(&stub.seen);
    let app = app(stub);

    let job_id = submit(
        &app,
        multipart_request("image", "cupom.png", "application/octet-stream", b"\x89PNG\r\n"),
    )
    .await;

    let (status, body) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "done");

    let data = &body["data"];
    assert_eq!(data["categoria"], "supermercado");
    assert_eq!(data["chave_acesso"], "");
    assert_eq!(data["produtos"][0]["produto"], "ARROZ 5KG");
    assert!(data.get("lista_de_produtos").is_none());

    // The filename decides the media type, not the declared part type.
    assert_eq!(seen.lock().unwrap().as_slice(), ["image/png"]);
}

#[tokio::test]
async fn portuguese_field_name_is_accepted() {
    let app = app(StubExtractor::replying("{\"categoria\":\"farmácia\"}"));
    let job_id = submit(&app, multipart_request("imagem", "foto.jpeg", "image/jpeg", b"\xff\xd8\xff")).await;
    let (status, body) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["categoria"], "farmácia");
}

#[tokio::test]
async fn unsupported_image_type_is_rejected_without_a_job() {
    let stub = StubExtractor::replying("{}");
    let seen = Arc::clone(&stub.seen);
    let app = app(stub);

    let (status, body) = send(
        &app,
        multipart_request("image", "cupom.gif", "image/gif", b"GIF89a"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("image/jpeg"), "{body}");

    let (_, health) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["jobs"], json!({ "processing": 0, "done": 0, "error": 0 }));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_image_field_is_rejected() {
    let app = app(StubExtractor::replying("{}"));
    let (status, body) = send(
        &app,
        multipart_request("document", "cupom.jpg", "image/jpeg", b"\xff\xd8\xff"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let config = ServiceConfig::builder().max_upload_bytes(2048).build().unwrap();
    let app = app_with(StubExtractor::replying("{}"), &config);
    let (status, _) = send(
        &app,
        multipart_request("image", "cupom.jpg", "image/jpeg", &[0u8; 8192]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ── Text submissions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn text_receipt_round_trip() {
    let stub = StubExtractor::replying(
        "{\"categoria\":\"posto de combustível\",\"CNPJ\":\"12.345.678/0001-90\",\
         \"access_key\":\"35240112345678000190650010000012341000012345\"}",
    );
    let seen = Arc::clone(&stub.seen);
    let app = app(stub);

    let job_id = submit(&app, text_request(json!({ "text": "POSTO IPIRANGA\nGASOLINA 40,00" }))).await;
    let (status, body) = poll_until_finished(&app, &job_id).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["CNPJ"], "12.345.678/0001-90");
    assert_eq!(
        body["data"]["chave_acesso"],
        "35240112345678000190650010000012341000012345"
    );
    assert!(body["data"].get("produtos").is_none());
    assert_eq!(seen.lock().unwrap().as_slice(), ["text"]);
}

#[tokio::test]
async fn extractor_values_are_returned_as_given() {
    let raw = json!({
        "razao_social": "MERCADINHO",
        "total_compra": 12,
        "produtos": [{ "codigo": 7891000100103u64, "preco_total": "12,00" }]
    });
    let app = app(StubExtractor::replying(&raw.to_string()));
    let job_id = submit(&app, text_request(json!({ "text": "MERCADINHO" }))).await;

    let (status, body) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let mut expected = raw;
    expected["chave_acesso"] = json!("");
    assert_eq!(body["data"], expected);
}

#[tokio::test]
async fn blank_or_missing_text_is_rejected() {
    let app = app(StubExtractor::replying("{}"));
    for body in [json!({}), json!({ "text": "" }), json!({ "text": "  \n " })] {
        let (status, reply) = send(&app, text_request(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body} gave {reply}");
        assert!(reply["error"].as_str().unwrap().contains("text"));
    }
}

#[tokio::test]
async fn non_json_text_body_is_rejected() {
    let app = app(StubExtractor::replying("{}"));
    let request = Request::builder()
        .method("POST")
        .uri("/api/interpretar-cupom-texto")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("CUPOM FISCAL"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ── Status polling ───────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_extractor_output_is_reported_on_poll() {
    let app = app(StubExtractor::replying("not json at all"));
    let job_id = submit(&app, text_request(json!({ "text": "CUPOM" }))).await;

    let (status, body) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(
        body["error"].as_str().unwrap().contains("invalid structured data"),
        "{body}"
    );
}

#[tokio::test]
async fn extractor_failure_is_reported_on_poll() {
    let stub = StubExtractor {
        reply: Err(ExtractorError::Api {
            message: "503 model overloaded".into(),
        }),
        ..StubExtractor::replying("")
    };
    let app = app(stub);
    let job_id = submit(&app, text_request(json!({ "text": "CUPOM" }))).await;

    let (status, body) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("503 model overloaded"));
}

#[tokio::test]
async fn job_reports_processing_until_extractor_answers() {
    let gate = Arc::new(Semaphore::new(0));
    let stub = StubExtractor {
        gate: Some(Arc::clone(&gate)),
        ..StubExtractor::replying("{\"categoria\":\"restaurante\"}")
    };
    let app = app(stub);
    let job_id = submit(&app, text_request(json!({ "text": "PF + SUCO" }))).await;

    let (status, body) = send(&app, status_request(&job_id)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "status": "processing" }));

    gate.add_permits(1);
    let (status, _) = poll_until_finished(&app, &job_id).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn finished_job_polls_are_stable() {
    let app = app(StubExtractor::replying(
        "{\"categoria\":\"padaria\",\"total_compra\":12.5}",
    ));
    let job_id = submit(&app, text_request(json!({ "text": "PAO FRANCES" }))).await;

    let first = poll_until_finished(&app, &job_id).await;
    let second = send(&app, status_request(&job_id)).await;
    let third = send(&app, status_request(&job_id)).await;
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = app(StubExtractor::replying("{}"));
    let (status, body) = send(&app, status_request("5b1c7e0a-2f7d-4c8e-9d7e-0f3a1b2c3d4e")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, status_request("not-a-job-id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_job_id_is_bad_request() {
    let app = app(StubExtractor::replying("{}"));
    let request = Request::get("/api/status").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("jobId"));
}

// ── Back-pressure ────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_queue_returns_service_unavailable() {
    let gate = Arc::new(Semaphore::new(0));
    let stub = StubExtractor {
        gate: Some(Arc::clone(&gate)),
        ..StubExtractor::replying("{\"categoria\":\"x\"}")
    };
    let seen = Arc::clone(&stub.seen);
    let config = ServiceConfig::builder()
        .workers(1)
        .queue_capacity(1)
        .build()
        .unwrap();
    let app = app_with(stub, &config);

    // First job occupies the only worker, second fills the queue.
    submit(&app, text_request(json!({ "text": "a" }))).await;
    while seen.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    submit(&app, text_request(json!({ "text": "b" }))).await;

    let (status, body) = send(&app, text_request(json!({ "text": "c" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");

    let (_, health) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["jobs"]["processing"], 2);

    gate.add_permits(2);
}

// ── Live extraction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn live_image_extraction() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run live tests");
        return;
    }
    let image = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/cupom.jpg");
    let Ok(bytes) = std::fs::read(&image) else {
        println!("SKIP — test file not found: {}", image.display());
        return;
    };

    let config = ServiceConfig::default();
    config.require_credential().expect("credential set");
    let extractor = LlmExtractor::from_config(&config).expect("provider available");
    let app = app_with(extractor, &config);

    let job_id = submit(&app, multipart_request("image", "cupom.jpg", "image/jpeg", &bytes)).await;
    let mut result = None;
    for _ in 0..120 {
        let (status, body) = send(&app, status_request(&job_id)).await;
        if status != StatusCode::ACCEPTED {
            result = Some((status, body));
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    let (status, body) = result.expect("live extraction finished within 2 minutes");
    println!("{}", serde_json::to_string_pretty(&body).unwrap());
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"]["categoria"].as_str().unwrap_or("").is_empty());
}
