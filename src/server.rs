//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Upload a text file (multipart field `file`) |
//! | `POST` | `/query` | Retrieve top-k chunks and an answer |
//! | `GET`  | `/documents/{id}` | Document with its chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413), `configuration_error` (500), `storage_error` (500),
//! `embedding_error` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend on
//! another port can call the API.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::Error;
use crate::models::{DocumentResponse, RetrievedChunk};
use crate::service::RagService;

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config).await?);
    if !service.llm_enabled() {
        tracing::warn!("no LLM configured; /query answers will be placeholders");
    }

    let app = router(service, config.server.max_upload_bytes);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "lexicon listening");
    println!("Lexicon RAG API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around a shared service.
pub fn router(service: Arc<RagService>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/query", post(handle_query))
        .route("/documents/{id}", get(handle_get_document))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Body-limit rejections keep their 413; anything else is a malformed upload.
fn multipart_error(context: &str, err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "payload_too_large",
            message: format!("{}: {}", context, err.body_text()),
        }
    } else {
        bad_request(format!("{}: {}", context, err.body_text()))
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Serialize)]
struct IngestResponse {
    status: String,
    document_id: i64,
    chunks_count: usize,
}

/// Reads the first multipart field named `file`; other fields are ignored.
async fn handle_ingest(
    State(service): State<Arc<RagService>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart body", e))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.txt".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error("failed to read upload", e))?;

        let outcome = service.ingest(&bytes, &filename).await?;
        return Ok(Json(IngestResponse {
            status: "success".to_string(),
            document_id: outcome.document_id,
            chunks_count: outcome.chunk_count,
        }));
    }

    Err(bad_request("missing multipart field 'file'"))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    results: Vec<RetrievedChunk>,
    answer: String,
}

async fn handle_query(
    State(service): State<Arc<RagService>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    let outcome = service.query(&req.query, req.k).await?;
    Ok(Json(QueryResponse {
        query: outcome.query,
        results: outcome.results,
        answer: outcome.answer,
    }))
}

// ============ GET /documents/{id} ============

async fn handle_get_document(
    State(service): State<Arc<RagService>>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentResponse>, AppError> {
    match service.get_document(id).await? {
        Some(doc) => Ok(Json(doc)),
        None => Err(not_found(format!("document {} not found", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{service_with, words};
    use crate::service::LLM_DISABLED_ANSWER;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    const MAX_UPLOAD: usize = 1024 * 1024;

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    fn query_request(payload: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let boundary = "lexicon-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/plain\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/ingest")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn empty_query_is_bad_request_and_not_audited() {
        let service = Arc::new(service_with(None));
        let app = router(service.clone(), MAX_UPLOAD);

        let response = app
            .oneshot(query_request(r#"{"query": ""}"#))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(service.stats().await.unwrap().audit_records, 0);
    }

    #[tokio::test]
    async fn malformed_query_body_is_bad_request() {
        let service = Arc::new(service_with(None));
        let app = router(service.clone(), MAX_UPLOAD);

        for payload in ["not json", r#"{"k": 2}"#, r#"{"query": "q", "k": -1}"#] {
            let response = app
                .clone()
                .oneshot(query_request(payload))
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);
        }
        assert_eq!(service.stats().await.unwrap().audit_records, 0);
    }

    #[tokio::test]
    async fn query_without_llm_returns_placeholder() {
        let service = Arc::new(service_with(None));
        service.ingest(words(50).as_bytes(), "doc.txt").await.unwrap();
        let app = router(service.clone(), MAX_UPLOAD);

        let response = app
            .oneshot(query_request(r#"{"query": "w1 w2", "k": 1}"#))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["query"], "w1 w2");
        assert_eq!(json["answer"], LLM_DISABLED_ANSWER);
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
        assert!(json["results"][0]["distance"].is_number());

        let audit = service.recent_audit(10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].response_text, LLM_DISABLED_ANSWER);
    }

    #[tokio::test]
    async fn ingest_multipart_file() {
        let service = Arc::new(service_with(None));
        let app = router(service.clone(), MAX_UPLOAD);

        let response = app
            .oneshot(multipart_request("file", "doc.txt", words(250).as_bytes()))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["chunks_count"], 2);

        let id = json["document_id"].as_i64().unwrap();
        let doc = service.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.filename, "doc.txt");
    }

    #[tokio::test]
    async fn ingest_rejects_missing_field_and_binary() {
        let service = Arc::new(service_with(None));
        let app = router(service.clone(), MAX_UPLOAD);

        let response = app
            .clone()
            .oneshot(multipart_request("upload", "doc.txt", b"hello"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(multipart_request("file", "doc.bin", &[0xff, 0xfe, 0xfd]))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(service.stats().await.unwrap().documents, 0);
    }

    #[tokio::test]
    async fn ingest_over_upload_limit_is_payload_too_large() {
        let service = Arc::new(service_with(None));
        let app = router(service.clone(), 64);

        let response = app
            .oneshot(multipart_request("file", "big.txt", words(200).as_bytes()))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "payload_too_large");
        assert_eq!(service.stats().await.unwrap().documents, 0);
    }

    #[tokio::test]
    async fn get_document_and_not_found() {
        let service = Arc::new(service_with(None));
        let outcome = service.ingest(b"hello world", "hello.txt").await.unwrap();
        let app = router(service, MAX_UPLOAD);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/documents/{}", outcome.document_id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["filename"], "hello.txt");
        assert_eq!(json["chunks"][0]["content"], "hello world");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/documents/9999")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = router(Arc::new(service_with(None)), MAX_UPLOAD);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
