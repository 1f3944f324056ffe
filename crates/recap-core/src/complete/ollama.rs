use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{CompletionProvider, CompletionRequest};
use crate::error::ServiceError;
use crate::http::{default_agent, post_json};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    model: String,
    base_url: String,
    agent: ureq::Agent,
}

impl OllamaProvider {
    pub fn new(model: &str, base_url: Option<&str>, timeout: Duration) -> Self {
        let base_url = base_url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            model: model.to_string(),
            base_url,
            agent: default_agent(timeout),
        }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.user,
            "stream": true,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        })
    }

    /// Concatenate the `response` tokens of an NDJSON stream up to `done`.
    fn parse_stream(raw: &str) -> Result<String, ServiceError> {
        let mut full_text = String::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let chunk: OllamaChunk = serde_json::from_str(line)
                .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
            if let Some(error) = chunk.error {
                return Err(ServiceError::Failed(error));
            }
            if let Some(token) = chunk.response {
                full_text.push_str(&token);
            }
            if chunk.done.unwrap_or(false) {
                break;
            }
        }
        if full_text.trim().is_empty() {
            return Err(ServiceError::Empty);
        }
        Ok(full_text)
    }
}

impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.build_request_body(request);
        let raw = post_json(&self.agent, &url, None, &body)?;
        Self::parse_stream(&raw)
    }
}

#[derive(Deserialize)]
struct OllamaChunk {
    response: Option<String>,
    done: Option<bool>,
    error: Option<String>,
}
