use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ServiceError;

/// A bounded slice of a document, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub context_prefix: Option<String>,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            context_prefix: None,
        }
    }

    /// Chunk text with the context marker prepended, as sent to the service.
    pub fn render(&self) -> String {
        match self.context_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{CONTEXT_MARKER_OPEN} {prefix}]\n\n{}", self.text)
            }
            _ => self.text.clone(),
        }
    }
}

pub(crate) const CONTEXT_MARKER_OPEN: &str = "[Context:";
const CONTEXT_MARKER_PREFIXES: [&str; 2] = [CONTEXT_MARKER_OPEN, "[上文续"];

/// Remove a leading context marker echoed back by the service.
pub fn strip_context_marker(output: &str) -> &str {
    let trimmed = output.trim_start();
    if !CONTEXT_MARKER_PREFIXES
        .iter()
        .any(|marker| trimmed.starts_with(marker))
    {
        return output;
    }
    match trimmed.find(']') {
        Some(end) => trimmed[end + 1..].trim_start(),
        None => output,
    }
}

/// Output of processing one chunk. `error` is set when `text` is the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub index: usize,
    pub text: String,
    pub error: Option<ServiceError>,
}

impl ChunkResult {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Single,
    Chunked,
}

impl PlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanMode::Single => "single",
            PlanMode::Chunked => "chunked",
        }
    }
}

/// How a document will be reduced. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct ReductionPlan {
    pub mode: PlanMode,
    pub cost: usize,
    pub chunks: Vec<Chunk>,
}

/// Final output of a reduction plus what happened along the way.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub text: String,
    pub mode: PlanMode,
    pub chunk_count: usize,
    pub failed_chunks: Vec<usize>,
}

impl Reduction {
    pub fn is_degraded(&self) -> bool {
        !self.failed_chunks.is_empty()
    }
}

/// Caller-owned cancellation flag shared with running reductions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// The underlying flag, for wiring into signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prepends_context_marker() {
        let chunk = Chunk {
            index: 1,
            text: "body".to_string(),
            context_prefix: Some("tail".to_string()),
        };
        assert_eq!(chunk.render(), "[Context: tail]\n\nbody");
    }

    #[test]
    fn render_without_prefix_is_plain_text() {
        assert_eq!(Chunk::new(0, "body").render(), "body");
    }

    #[test]
    fn strip_context_marker_removes_echoed_marker() {
        assert_eq!(strip_context_marker("[Context: tail]\n\nbody"), "body");
        assert_eq!(strip_context_marker("  [上文续：尾巴]\n正文"), "正文");
    }

    #[test]
    fn strip_context_marker_keeps_other_brackets() {
        assert_eq!(strip_context_marker("[Part 1] body"), "[Part 1] body");
        assert_eq!(strip_context_marker("[Context without end"), "[Context without end");
        assert_eq!(
            strip_context_marker("[Contextual note] body"),
            "[Contextual note] body"
        );
        assert_eq!(strip_context_marker("[Contexts] body"), "[Contexts] body");
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
