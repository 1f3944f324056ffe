pub mod ollama;
pub mod openai;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;

const DEFAULT_OLLAMA_MODEL: &str = "qwen3:30b-a3b";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// One chat-style completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Blocking text-completion backend.
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Openai,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "openai" => Ok(ProviderKind::Openai),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ServiceError::Failed(format!(
                "unknown completion provider: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub fn create_completion_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn CompletionProvider>, ServiceError> {
    let model = settings
        .model
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match settings.kind {
        ProviderKind::Ollama => Ok(Arc::new(ollama::OllamaProvider::new(
            model.unwrap_or(DEFAULT_OLLAMA_MODEL),
            settings.base_url.as_deref(),
            settings.timeout,
        ))),
        ProviderKind::Openai => Ok(Arc::new(openai::OpenAiProvider::new(
            model.unwrap_or(DEFAULT_OPENAI_MODEL),
            settings.base_url.as_deref(),
            settings.api_key.as_deref(),
            settings.timeout,
        )?)),
    }
}
