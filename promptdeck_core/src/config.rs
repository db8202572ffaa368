use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_RELAY_URL: &str = "http://localhost:3000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimationStrategy {
    #[default]
    Flip,
    Native,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub animation: AnimationStrategy,
    /// Fixed column count; derived from the terminal width when unset.
    #[serde(default)]
    pub columns: Option<u16>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_theme() -> String {
    "auto".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            data_dir: None,
            theme: default_theme(),
            catalog_path: None,
            animation: AnimationStrategy::default(),
            columns: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            providers: Vec::new(),
            model: default_model(),
            fallback_models: Vec::new(),
            max_tokens: default_max_tokens(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Groq,
    Ollama,
    Custom,
}

impl ProviderKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC",
            ProviderKind::OpenAI => "OPENAI",
            ProviderKind::Groq => "GROQ",
            ProviderKind::Ollama => "OLLAMA",
            ProviderKind::Custom => "CUSTOM",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::Custom => "https://api.openai.com/v1",
        }
    }

    pub fn default_auth(self) -> ProviderAuth {
        match self {
            ProviderKind::Anthropic => ProviderAuth::XApiKey,
            ProviderKind::Ollama => ProviderAuth::None,
            _ => ProviderAuth::Bearer,
        }
    }

    pub fn default_models(self) -> Vec<String> {
        match self {
            ProviderKind::Anthropic => vec![DEFAULT_MODEL.to_string()],
            ProviderKind::OpenAI => vec!["gpt-4o-mini".to_string()],
            ProviderKind::Groq => vec!["llama-3.3-70b-versatile".to_string()],
            ProviderKind::Ollama => vec!["llama3.2".to_string()],
            ProviderKind::Custom => Vec::new(),
        }
    }

    /// Anthropic speaks the Messages API; everything else is OpenAI-compatible.
    pub fn is_anthropic(self) -> bool {
        matches!(self, ProviderKind::Anthropic)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAuth {
    #[default]
    Bearer,
    XApiKey,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub auth: ProviderAuth,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn builtin(kind: ProviderKind, api_key: Option<String>) -> Self {
        Self {
            kind,
            name: Some(kind.display_name().to_string()),
            api_key,
            base_url: kind.default_base_url().to_string(),
            auth: kind.default_auth(),
            enabled: true,
            models: kind.default_models(),
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_ref()
            .filter(|n| !n.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| self.kind.display_name().to_string())
    }

    pub fn normalized(mut self) -> Self {
        if self.base_url.trim().is_empty() {
            self.base_url = self.kind.default_base_url().to_string();
        }

        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();

        if self.models.is_empty() {
            self.models = self.kind.default_models();
        } else {
            self.models = self
                .models
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }

        self.api_key = clean_optional(self.api_key.take());
        self.name = clean_optional(self.name.take());

        // An unset auth deserializes as Bearer; let the provider kind decide.
        if self.auth == ProviderAuth::Bearer {
            self.auth = self.kind.default_auth();
        }

        self
    }

    pub fn is_configured(&self) -> bool {
        if !self.enabled {
            return false;
        }

        match self.auth {
            ProviderAuth::None => true,
            ProviderAuth::Bearer | ProviderAuth::XApiKey => self
                .api_key
                .as_ref()
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("promptdeck");
        Ok(config_dir.join("config.toml"))
    }

    /// Loads the user config (defaults when absent) and applies environment overrides.
    pub async fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?).await?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).await?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content).await?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.relay.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        if let Some(url) = clean_optional(lookup("PROMPTDECK_RELAY_URL")) {
            self.client.relay_url = url;
        }

        let key = clean_optional(lookup("CLAUDE_API_KEY"))
            .or_else(|| clean_optional(lookup("ANTHROPIC_API_KEY")));
        if let Some(key) = key {
            match self
                .relay
                .providers
                .iter_mut()
                .find(|p| p.kind == ProviderKind::Anthropic)
            {
                Some(provider) => provider.api_key = Some(key),
                None => self
                    .relay
                    .providers
                    .insert(0, ProviderConfig::builtin(ProviderKind::Anthropic, Some(key))),
            }
        }
    }

    /// Providers normalized; when none are listed, a keyless Anthropic entry.
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        let providers = if self.relay.providers.is_empty() {
            vec![ProviderConfig::builtin(ProviderKind::Anthropic, None)]
        } else {
            self.relay.providers.clone()
        };

        providers
            .into_iter()
            .map(ProviderConfig::normalized)
            .collect()
    }

    pub fn configured_providers(&self) -> Vec<ProviderConfig> {
        self.effective_providers()
            .into_iter()
            .filter(|p| p.is_configured())
            .collect()
    }

    pub fn has_keys(&self) -> bool {
        !self.configured_providers().is_empty()
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.client
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("promptdeck")))
    }
}

fn clean_optional(input: Option<String>) -> Option<String> {
    input.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.client.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(config.client.theme, "auto");
        assert_eq!(config.client.animation, AnimationStrategy::Flip);
        assert_eq!(config.relay.port, 3000);
        assert_eq!(config.relay.model, "claude-3-haiku-20240307");
        assert_eq!(config.relay.max_tokens, 1000);
        assert_eq!(config.relay.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn sections_parse_from_toml() {
        let raw = r#"
[client]
relay_url = "http://relay.local:8080"
animation = "native"
columns = 2

[relay]
port = 8080
fallback_models = ["gpt-4o-mini"]

[[relay.providers]]
kind = "openai"
api_key = "sk-test"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.client.animation, AnimationStrategy::Native);
        assert_eq!(config.client.columns, Some(2));
        assert_eq!(config.relay.port, 8080);
        let providers = config.configured_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind, ProviderKind::OpenAI);
        assert_eq!(providers[0].auth, ProviderAuth::Bearer);
    }

    #[test]
    fn env_overrides_port_url_and_key() {
        let mut config = Config::default();
        assert!(!config.has_keys());

        config.apply_env(env(&[
            ("PORT", "4100"),
            ("PROMPTDECK_RELAY_URL", " http://10.0.0.2:4100 "),
            ("ANTHROPIC_API_KEY", "sk-ant-fallback"),
            ("CLAUDE_API_KEY", "sk-ant-primary"),
        ]));

        assert_eq!(config.relay.port, 4100);
        assert_eq!(config.client.relay_url, "http://10.0.0.2:4100");
        let providers = config.configured_providers();
        assert_eq!(providers[0].kind, ProviderKind::Anthropic);
        assert_eq!(providers[0].api_key.as_deref(), Some("sk-ant-primary"));
        assert_eq!(providers[0].auth, ProviderAuth::XApiKey);
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("PORT", "not-a-port")]));
        assert_eq!(config.relay.port, DEFAULT_PORT);
    }

    #[test]
    fn env_key_fills_existing_anthropic_provider() {
        let mut config = Config::default();
        config.relay.providers = vec![
            ProviderConfig::builtin(ProviderKind::Ollama, None),
            ProviderConfig::builtin(ProviderKind::Anthropic, None),
        ];
        config.apply_env(env(&[("CLAUDE_API_KEY", "sk-ant")]));
        assert_eq!(config.relay.providers.len(), 2);
        assert_eq!(
            config.relay.providers[1].api_key.as_deref(),
            Some("sk-ant")
        );
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.relay.port, DEFAULT_PORT);
    }
}
