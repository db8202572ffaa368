//! HTTP surface of the relay: chat forwarding, file uploads, health and
//! the static site.

use crate::llm::LlmBridge;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use promptdeck_core::relay::{UploadReceipt, UploadedFile, EMPTY_REPLY_MESSAGE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful educational assistant.";

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub const ALLOWED_UPLOAD_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "image/jpeg",
    "image/png",
];

#[derive(Clone)]
pub struct AppState {
    pub bridge: Option<Arc<dyn LlmBridge>>,
    pub provider: String,
    pub model: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default, alias = "systemPrompt")]
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponseBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    provider: String,
    model: String,
    configured: bool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Claude API key not configured")]
    NotConfigured,
    #[error("Message is required")]
    EmptyMessage,
    #[error("Failed to process chat message")]
    Upstream,
    #[error("No file uploaded")]
    NoFile,
    #[error("Unsupported file type. Please upload PDF, PowerPoint, Word, or image files.")]
    UnsupportedType,
    #[error("File too large. Maximum size is {0}MB.")]
    TooLarge(usize),
    #[error("Invalid upload: {0}")]
    BadUpload(String),
    #[error("Failed to upload file")]
    Storage,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotConfigured | ApiError::Upstream | ApiError::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::EmptyMessage | ApiError::NoFile | ApiError::BadUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route(
            "/api/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/health", get(handle_health))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(cors)
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        provider: state.provider.clone(),
        model: state.model.clone(),
        configured: state.bridge.is_some(),
    })
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let Some(bridge) = state.bridge.as_ref() else {
        warn!("Chat request rejected: no provider credentials");
        return Err(ApiError::NotConfigured);
    };
    if body.message.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let system = body
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    match bridge.chat(system, &body.message).await {
        Ok(reply) => {
            let message = if reply.trim().is_empty() {
                EMPTY_REPLY_MESSAGE.to_string()
            } else {
                reply
            };
            Ok(Json(ChatResponseBody { message }))
        }
        Err(err) => {
            warn!("Chat API error: {:#}", err);
            Err(ApiError::Upstream)
        }
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    let limit_mb = state.max_upload_bytes / (1024 * 1024);
    let multipart_error = |err: MultipartError| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge(limit_mb)
        } else {
            ApiError::BadUpload(err.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(sanitize_file_name)
            .unwrap_or_else(|| "upload".to_string());
        let mime = field
            .content_type()
            .map(|m| m.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_UPLOAD_TYPES.contains(&mime.as_str()) {
            warn!("Rejected upload {} with type {:?}", original_name, mime);
            return Err(ApiError::UnsupportedType);
        }

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > state.max_upload_bytes {
            return Err(ApiError::TooLarge(limit_mb));
        }

        let stored_name = stored_file_name(&original_name);
        let dest = state.upload_dir.join(&stored_name);
        if let Err(err) = tokio::fs::create_dir_all(&state.upload_dir).await {
            warn!("Upload dir {} unavailable: {}", state.upload_dir.display(), err);
            return Err(ApiError::Storage);
        }
        if let Err(err) = tokio::fs::write(&dest, &bytes).await {
            warn!("Failed to store {}: {}", dest.display(), err);
            return Err(ApiError::Storage);
        }

        info!("Stored upload {} ({} bytes)", stored_name, bytes.len());
        return Ok(Json(UploadReceipt {
            success: true,
            message: format!("File \"{}\" uploaded successfully.", original_name),
            file: UploadedFile {
                name: original_name,
                mime,
                size: bytes.len() as u64,
                path: stored_name,
            },
        }));
    }

    Err(ApiError::NoFile)
}

/// `<millis>-<uuid>-<name>`
fn stored_file_name(original: &str) -> String {
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        original
    )
}

// Client-supplied names may carry directories; keep the last component only.
fn sanitize_file_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if last.is_empty() || last == "." || last == ".." {
        "upload".to_string()
    } else {
        last.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct FakeBridge {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeBridge {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("upstream 529".to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBridge for FakeBridge {
        async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn state(bridge: Option<Arc<dyn LlmBridge>>, upload_dir: &Path) -> AppState {
        AppState {
            bridge,
            provider: "ANTHROPIC".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            upload_dir: upload_dir.to_path_buf(),
            max_upload_bytes: 1024,
        }
    }

    fn app(bridge: Option<Arc<dyn LlmBridge>>, dir: &Path) -> Router {
        router(state(bridge, &dir.join("uploads")), &dir.join("public"))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(field: &str, file_name: &str, mime: &str, contents: &[u8]) -> Request<Body> {
        let boundary = "promptdeck-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_forwards_prompt_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FakeBridge::replying("Hello there");
        let response = app(Some(bridge.clone()), dir.path())
            .oneshot(chat_request(
                serde_json::json!({"message": "Hi", "prompt": "You design lessons."}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Hello there");
        let seen = bridge.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![("You design lessons.".to_string(), "Hi".to_string())]
        );
    }

    #[tokio::test]
    async fn chat_accepts_system_prompt_alias_and_defaults_empty_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FakeBridge::replying("ok");
        let app = app(Some(bridge.clone()), dir.path());

        app.clone()
            .oneshot(chat_request(
                serde_json::json!({"message": "a", "systemPrompt": "Alias prompt"}),
            ))
            .await
            .unwrap();
        app.oneshot(chat_request(serde_json::json!({"message": "b", "prompt": "  "})))
            .await
            .unwrap();

        let seen = bridge.seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "Alias prompt");
        assert_eq!(seen[1].0, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn chat_without_credentials_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(None, dir.path())
            .oneshot(chat_request(serde_json::json!({"message": "Hi", "prompt": "p"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Claude API key not configured"
        );
    }

    #[tokio::test]
    async fn upstream_failure_and_empty_reply() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(Some(FakeBridge::failing()), dir.path())
            .oneshot(chat_request(serde_json::json!({"message": "Hi", "prompt": "p"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Failed to process chat message"
        );

        let response = app(Some(FakeBridge::replying("  ")), dir.path())
            .oneshot(chat_request(serde_json::json!({"message": "Hi", "prompt": "p"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], EMPTY_REPLY_MESSAGE);
    }

    #[tokio::test]
    async fn upload_stores_allowed_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(None, dir.path())
            .oneshot(upload_request("file", "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["file"]["name"], "notes.txt");
        assert_eq!(body["file"]["type"], "text/plain");
        assert_eq!(body["file"]["size"], 5);
        let stored = body["file"]["path"].as_str().unwrap();
        assert!(stored.ends_with("-notes.txt"));
        let on_disk = std::fs::read(dir.path().join("uploads").join(stored)).unwrap();
        assert_eq!(on_disk, b"hello");
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_type_missing_file_and_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(None, dir.path());

        let response = app
            .clone()
            .oneshot(upload_request("file", "clip.mp4", "video/mp4", b"0000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            json_body(response).await["error"],
            "Unsupported file type. Please upload PDF, PowerPoint, Word, or image files."
        );

        let response = app
            .clone()
            .oneshot(upload_request("other", "notes.txt", "text/plain", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No file uploaded");

        let big = vec![b'a'; 2048];
        let response = app
            .oneshot(upload_request("file", "big.txt", "text/plain", &big))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn health_reports_provider() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(None, dir.path())
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["configured"], false);
    }

    #[test]
    fn file_names_lose_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\deck.pptx"), "deck.pptx");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert!(stored_file_name("a.pdf").ends_with("-a.pdf"));
    }
}
