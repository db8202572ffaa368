use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONNECTIVITY_FAILURE_MESSAGE: &str =
    "I apologize, but I'm having trouble connecting to the AI service right now. Please try again later.";
pub const FALLBACK_GREETING: &str = "I'm ready to help you use this educational prompt! Based on the prompt requirements, please share the specific details or context you'd like me to work with, and I'll provide a tailored response.";
pub const EMPTY_REPLY_MESSAGE: &str =
    "I apologize, but I encountered an error processing your request.";

/// Body of `POST /api/chat`: `prompt` is the system instruction, `message` the single user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(alias = "systemPrompt")]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_for_name(&name).to_string();
        Ok(Self { name, mime, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub success: bool,
    pub file: UploadedFile,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed relay response: {0}")]
    Decode(String),
    #[error("relay call ended without a result")]
    Interrupted,
}

#[async_trait]
pub trait Relay: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String, RelayError>;
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, RelayError>;
}

#[derive(Debug, Clone)]
pub struct HttpRelay {
    http_client: Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_error(response: reqwest::Response) -> RelayError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        RelayError::Status { status, message }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn chat(&self, request: ChatRequest) -> Result<String, RelayError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        let text = response.text().await?;
        let reply: ChatReply =
            serde_json::from_str(&text).map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(reply.message)
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, RelayError> {
        let url = format!("{}/api/upload", self.base_url);
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self.http_client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| RelayError::Decode(e.to_string()))
    }
}

/// Best-effort MIME type from a file extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
