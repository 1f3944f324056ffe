use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{CompletionProvider, CompletionRequest};
use crate::error::ServiceError;
use crate::http::{default_agent, post_json};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model: String,
    base_url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl OpenAiProvider {
    /// A key is required for the hosted endpoint; self-hosted compatible
    /// servers on a custom `base_url` may run without one.
    pub fn new(
        model: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = base_url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let api_key = api_key
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if api_key.is_none() && base_url == DEFAULT_BASE_URL {
            return Err(ServiceError::Failed("OpenAI API key not set".into()));
        }
        Ok(Self {
            model: model.to_string(),
            base_url,
            api_key,
            agent: default_agent(timeout),
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn parse_response(body: &str) -> Result<String, ServiceError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidResponse("no choices".into()))?;
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(ServiceError::Empty),
        }
    }
}

impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(request);
        let raw = post_json(&self.agent, &url, self.api_key.as_deref(), &body)?;
        Self::parse_response(raw.trim())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
