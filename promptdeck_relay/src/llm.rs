use anyhow::{anyhow, Result};
use async_trait::async_trait;
use promptdeck_core::config::{Config, ProviderAuth, ProviderConfig, ProviderKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Upstream model access used by the chat endpoint.
#[async_trait]
pub trait LlmBridge: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http_client: Client,
    targets: Vec<LlmTarget>,
    max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct LlmTarget {
    provider_name: String,
    kind: ProviderKind,
    api_key: Option<String>,
    base_url: String,
    auth: ProviderAuth,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContentBlock>>,
}

impl LlmClient {
    /// Builds the ordered target list from the relay config. Returns `None`
    /// when no provider has usable credentials.
    pub fn from_config(config: &Config) -> Option<Self> {
        let providers = config.configured_providers();
        let targets = build_targets(
            &providers,
            &config.relay.model,
            &config.relay.fallback_models,
        );
        if targets.is_empty() {
            return None;
        }
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Some(Self {
            http_client,
            targets,
            max_tokens: config.relay.max_tokens,
        })
    }

    pub fn primary(&self) -> (&str, &str) {
        self.targets
            .first()
            .map(|t| (t.provider_name.as_str(), t.model.as_str()))
            .unwrap_or(("none", "none"))
    }

    pub async fn completion(&self, system_prompt: &str, user_input: &str) -> Result<String> {
        let mut errors = Vec::new();
        for target in &self.targets {
            let attempt = if target.kind.is_anthropic() {
                self.anthropic_completion(target, system_prompt, user_input)
                    .await
            } else {
                self.openai_completion(target, system_prompt, user_input)
                    .await
            };
            match attempt {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::warn!("[{} | {}] {}", target.provider_name, target.model, e);
                    errors.push(format!(
                        "- [{} | {}] {}",
                        target.provider_name, target.model, e
                    ))
                }
            }
        }

        Err(anyhow!(
            "All configured providers/models failed:\n{}",
            errors.join("\n")
        ))
    }

    async fn anthropic_completion(
        &self,
        target: &LlmTarget,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<String> {
        let url = format!("{}/messages", target.base_url.trim_end_matches('/'));
        let request_body = anthropic_request(target, self.max_tokens, system_prompt, user_input);

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        request = apply_auth_header(request, target)?;
        let response = request.json(&request_body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        anthropic_reply(&text)
    }

    async fn openai_completion(
        &self,
        target: &LlmTarget,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", target.base_url.trim_end_matches('/'));
        let mut request_body = ChatRequest {
            model: target.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_input.to_string(),
                },
            ],
            max_tokens: Some(self.max_tokens),
        };

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        request = apply_auth_header(request, target)?;
        let response = request.json(&request_body).send().await?;

        let mut status = response.status();
        let mut text = response.text().await?;

        if !status.is_success() && likely_rejects_max_tokens(status.as_u16(), &text) {
            request_body.max_tokens = None;
            let mut retry = self
                .http_client
                .post(&url)
                .header("Content-Type", "application/json");
            retry = apply_auth_header(retry, target)?;
            let retry_response = retry.json(&request_body).send().await?;
            status = retry_response.status();
            text = retry_response.text().await?;
        }

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse LLM response: {} | Raw response: {}",
                e,
                truncate_error(&text)
            )
        })?;

        let first_choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices returned from LLM"))?;

        match (first_choice.message, first_choice.finish_reason) {
            (Some(msg), _) => Ok(msg.content),
            (None, Some(reason)) => Err(anyhow!("LLM stopped execution. Reason: {}", reason)),
            (None, None) => Err(anyhow!("No content or reason in LLM response")),
        }
    }
}

#[async_trait]
impl LlmBridge for LlmClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        self.completion(system, user).await
    }
}

/// The chat `prompt` is the system instruction; `message` is the only user turn.
fn anthropic_request(
    target: &LlmTarget,
    max_tokens: u32,
    system_prompt: &str,
    user_input: &str,
) -> AnthropicRequest {
    AnthropicRequest {
        model: target.model.clone(),
        max_tokens,
        system: system_prompt.to_string(),
        messages: vec![AnthropicMessage {
            role: "user".to_string(),
            content: user_input.to_string(),
        }],
    }
}

fn anthropic_reply(text: &str) -> Result<String> {
    let parsed: AnthropicResponse = serde_json::from_str(text).map_err(|e| {
        anyhow!(
            "Failed to parse LLM response: {} | Raw response: {}",
            e,
            truncate_error(text)
        )
    })?;

    // The first text block is the reply; an empty body is left to the caller.
    Ok(parsed
        .content
        .unwrap_or_default()
        .into_iter()
        .filter(|b| b.kind.as_deref() == Some("text"))
        .find_map(|b| b.text)
        .unwrap_or_default())
}

/// Primary model on the first provider, then each provider's own models,
/// then the global fallbacks on every provider.
fn build_targets(
    providers: &[ProviderConfig],
    primary_model: &str,
    fallback_models: &[String],
) -> Vec<LlmTarget> {
    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |target: LlmTarget| {
        if seen.insert(target_key(&target)) {
            targets.push(target);
        }
    };

    if let (Some(first), Some(model)) = (providers.first(), clean(primary_model)) {
        push(target_from_provider(first, model));
    }

    for p in providers {
        for m in &p.models {
            if let Some(model) = clean(m) {
                push(target_from_provider(p, model));
            }
        }
    }

    for m in fallback_models {
        if let Some(model) = clean(m) {
            for p in providers {
                push(target_from_provider(p, model.clone()));
            }
        }
    }

    targets
}

fn status_error(status: u16, text: &str) -> anyhow::Error {
    let lower = text.to_lowercase();
    let hint = if status == 429 || lower.contains("rate limit") || lower.contains("quota") {
        " (quota/rate-limit, trying fallback)"
    } else if status == 401 || status == 403 {
        " (check the API key)"
    } else {
        ""
    };
    anyhow!(
        "LLM API Error (Status {}): {}{}",
        status,
        truncate_error(text),
        hint
    )
}

fn likely_rejects_max_tokens(status_code: u16, body: &str) -> bool {
    if status_code != 400 {
        return false;
    }
    let lower = body.to_lowercase();
    lower.contains("max_tokens")
        || lower.contains("max completion tokens")
        || lower.contains("unknown field")
        || lower.contains("unrecognized field")
}

fn apply_auth_header(
    request: reqwest::RequestBuilder,
    target: &LlmTarget,
) -> Result<reqwest::RequestBuilder> {
    match target.auth {
        ProviderAuth::None => Ok(request),
        ProviderAuth::Bearer => {
            let key = target
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow!("Missing API key for provider {}", target.provider_name))?;
            Ok(request.header("Authorization", format!("Bearer {}", key)))
        }
        ProviderAuth::XApiKey => {
            let key = target
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow!("Missing API key for provider {}", target.provider_name))?;
            Ok(request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION))
        }
    }
}

fn target_from_provider(provider: &ProviderConfig, model: String) -> LlmTarget {
    LlmTarget {
        provider_name: provider.display_name(),
        kind: provider.kind,
        api_key: provider.api_key.clone(),
        base_url: provider.base_url.trim().trim_end_matches('/').to_string(),
        auth: provider.auth,
        model,
    }
}

fn target_key(target: &LlmTarget) -> String {
    format!(
        "{}|{}|{:?}|{}",
        target.provider_name, target.base_url, target.auth, target.model
    )
}

fn truncate_error(text: &str) -> String {
    const MAX: usize = 320;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn clean(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(kind: ProviderKind, key: &str) -> ProviderConfig {
        ProviderConfig::builtin(kind, Some(key.to_string())).normalized()
    }

    #[test]
    fn no_credentials_means_no_client() {
        let config = Config::default();
        assert!(LlmClient::from_config(&config).is_none());
    }

    #[test]
    fn anthropic_key_yields_default_model_first() {
        let mut config = Config::default();
        config.apply_env(|name| (name == "CLAUDE_API_KEY").then(|| "sk-ant-test".to_string()));
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.primary(), ("ANTHROPIC", "claude-3-haiku-20240307"));
        assert_eq!(client.max_tokens, 1000);
        assert_eq!(client.targets.len(), 1);
        assert_eq!(client.targets[0].auth, ProviderAuth::XApiKey);
        assert_eq!(client.targets[0].base_url, "https://api.anthropic.com/v1");
    }

    #[test]
    fn targets_are_ordered_and_deduplicated() {
        let providers = vec![
            keyed(ProviderKind::Anthropic, "a"),
            keyed(ProviderKind::Groq, "g"),
        ];
        let targets = build_targets(
            &providers,
            "claude-3-haiku-20240307",
            &["shared-model".to_string(), " ".to_string()],
        );
        let order: Vec<(&str, &str)> = targets
            .iter()
            .map(|t| (t.provider_name.as_str(), t.model.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("ANTHROPIC", "claude-3-haiku-20240307"),
                ("GROQ", "llama-3.3-70b-versatile"),
                ("ANTHROPIC", "shared-model"),
                ("GROQ", "shared-model"),
            ]
        );
    }

    fn anthropic_target() -> LlmTarget {
        target_from_provider(
            &keyed(ProviderKind::Anthropic, "sk-ant-test"),
            "claude-3-haiku-20240307".to_string(),
        )
    }

    #[test]
    fn anthropic_request_carries_prompt_as_system_and_one_user_turn() {
        let body = anthropic_request(
            &anthropic_target(),
            1000,
            "You design lessons.",
            "Intro to statistics",
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "claude-3-haiku-20240307");
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["system"], "You design lessons.");
        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Intro to statistics");
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn anthropic_reply_takes_first_text_block() {
        let raw = r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"Hello class"},{"type":"text","text":"ignored"}]}"#;
        assert_eq!(anthropic_reply(raw).unwrap(), "Hello class");
        assert_eq!(anthropic_reply(r#"{"content":[]}"#).unwrap(), "");
        assert_eq!(anthropic_reply("{}").unwrap(), "");
        let err = anthropic_reply("not json").unwrap_err().to_string();
        assert!(err.contains("Failed to parse LLM response"));
    }

    #[test]
    fn anthropic_auth_sets_key_and_version_headers() {
        let target = anthropic_target();
        let builder = Client::new().post("http://localhost/v1/messages");
        let request = apply_auth_header(builder, &target).unwrap().build().unwrap();
        assert_eq!(request.headers()["x-api-key"], "sk-ant-test");
        assert_eq!(request.headers()["anthropic-version"], ANTHROPIC_VERSION);
        assert_eq!(ANTHROPIC_VERSION, "2023-06-01");
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn max_tokens_rejection_is_detected() {
        assert!(likely_rejects_max_tokens(
            400,
            "Unsupported parameter: 'max_tokens'"
        ));
        assert!(!likely_rejects_max_tokens(500, "max_tokens"));
        assert!(!likely_rejects_max_tokens(400, "bad request"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(400);
        let cut = truncate_error(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 323);
    }
}
