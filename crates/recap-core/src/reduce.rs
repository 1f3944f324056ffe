//! Bounded fan-out of chunks to the completion service.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::{ReduceError, ServiceError};
use crate::text::{head_chars, preview};
use crate::types::{CancelToken, Chunk, ChunkResult, strip_context_marker};

const CANCEL_POLL: Duration = Duration::from_millis(50);
const PREVIEW_CHARS: usize = 80;

/// Processes one chunk against the external service.
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    async fn process(&self, chunk: &Chunk, total_chunks: usize) -> Result<String, ServiceError>;
}

#[async_trait]
impl<F, Fut> ChunkProcessor for F
where
    F: Fn(Chunk, usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ServiceError>> + Send + 'static,
{
    async fn process(&self, chunk: &Chunk, total_chunks: usize) -> Result<String, ServiceError> {
        (self)(chunk.clone(), total_chunks).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOptions {
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    /// Characters of raw chunk text kept when a call fails. `None` keeps it all.
    pub fallback_chars: Option<usize>,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            call_timeout: Duration::from_secs(60),
            fallback_chars: Some(200),
        }
    }
}

/// Run every chunk through `processor`, at most `max_concurrency` at a time.
///
/// Results come back in input order, one per chunk. A failed, timed out or
/// empty call yields a fallback result instead of failing the batch; only
/// cancellation aborts the whole reduction.
pub async fn reduce(
    chunks: Vec<Chunk>,
    processor: Arc<dyn ChunkProcessor>,
    options: &ReduceOptions,
    cancel: &CancelToken,
) -> Result<Vec<ChunkResult>, ReduceError> {
    let total = chunks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let fallbacks: Vec<(usize, String)> = chunks
        .iter()
        .map(|chunk| (chunk.index, fallback_text(&chunk.text, options.fallback_chars)))
        .collect();
    let mut positions = HashMap::with_capacity(total);
    let mut tasks = JoinSet::new();

    tracing::debug!(total, max_concurrency = options.max_concurrency, "dispatching chunks");
    for (position, chunk) in chunks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            tasks.abort_all();
            return Err(ReduceError::Cancelled);
        }
        let job = ChunkJob {
            chunk,
            total,
            processor: Arc::clone(&processor),
            semaphore: Arc::clone(&semaphore),
            cancel: cancel.clone(),
            timeout: options.call_timeout,
            fallback_chars: options.fallback_chars,
        };
        let handle = tasks.spawn(job.run());
        positions.insert(handle.id(), position);
    }

    let mut slots: Vec<Option<ChunkResult>> = vec![None; total];
    let mut tick = tokio::time::interval(CANCEL_POLL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !tasks.is_empty() {
        tokio::select! {
            joined = tasks.join_next_with_id() => match joined {
                Some(Ok((id, Some(result)))) => {
                    if let Some(&position) = positions.get(&id) {
                        slots[position] = Some(result);
                    }
                }
                Some(Ok((_, None))) => {
                    tasks.abort_all();
                    return Err(ReduceError::Cancelled);
                }
                Some(Err(err)) => {
                    if let Some(&position) = positions.get(&err.id()) {
                        let (index, text) = &fallbacks[position];
                        tracing::warn!(chunk = index, total, error = %err, "chunk task failed, using fallback");
                        slots[position] = Some(ChunkResult {
                            index: *index,
                            text: text.clone(),
                            error: Some(ServiceError::Failed(err.to_string())),
                        });
                    }
                }
                None => break,
            },
            _ = tick.tick() => {
                if cancel.is_cancelled() {
                    tasks.abort_all();
                    return Err(ReduceError::Cancelled);
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(ReduceError::Cancelled);
    }

    let results = slots
        .into_iter()
        .zip(fallbacks)
        .map(|(slot, (index, text))| {
            slot.unwrap_or(ChunkResult {
                index,
                text,
                error: Some(ServiceError::Failed("chunk produced no result".into())),
            })
        })
        .collect();
    Ok(results)
}

/// Leading `limit` characters of the raw chunk, marked when truncated.
pub fn fallback_text(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) => {
            let head = head_chars(text, limit);
            if head.len() < text.len() {
                format!("{head}...")
            } else {
                head.to_string()
            }
        }
        None => text.to_string(),
    }
}

struct ChunkJob {
    chunk: Chunk,
    total: usize,
    processor: Arc<dyn ChunkProcessor>,
    semaphore: Arc<Semaphore>,
    cancel: CancelToken,
    timeout: Duration,
    fallback_chars: Option<usize>,
}

impl ChunkJob {
    /// `None` when the reduction was cancelled before this chunk's call.
    ///
    /// The call runs in its own task that owns the permit. A timeout stops
    /// waiting for it, but the permit is only released once the call itself
    /// returns, so abandoned calls still count against the cap.
    async fn run(self) -> Option<ChunkResult> {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            return None;
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        let started = Instant::now();
        tracing::debug!(chunk = self.chunk.index, total = self.total, "calling service");
        let processor = Arc::clone(&self.processor);
        let chunk = self.chunk.clone();
        let total = self.total;
        let mut call = tokio::spawn(async move {
            let _permit = permit;
            processor.process(&chunk, total).await
        });
        let mut guard = AbortOnDrop(Some(call.abort_handle()));
        let outcome = match tokio::time::timeout(self.timeout, &mut call).await {
            Ok(Ok(Ok(text))) => clean_output(&text),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(join_err)) => Err(ServiceError::Failed(format!("call task failed: {join_err}"))),
            Err(_) => {
                guard.0 = None;
                Err(ServiceError::Timeout(self.timeout.as_millis()))
            }
        };
        tracing::debug!(
            chunk = self.chunk.index,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "service call finished"
        );

        let result = match outcome {
            Ok(text) => ChunkResult {
                index: self.chunk.index,
                text,
                error: None,
            },
            Err(err) => {
                tracing::warn!(
                    chunk = self.chunk.index,
                    total = self.total,
                    error = %err,
                    preview = %preview(&self.chunk.text, PREVIEW_CHARS),
                    "chunk failed, using fallback"
                );
                ChunkResult {
                    index: self.chunk.index,
                    text: fallback_text(&self.chunk.text, self.fallback_chars),
                    error: Some(err),
                }
            }
        };
        Some(result)
    }
}

/// Aborts the call task when the job is dropped mid-call, which only
/// happens when the reduction is cancelled. Cleared on timeout so the
/// abandoned call keeps its permit until it returns.
struct AbortOnDrop(Option<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Echoed context marker removed; otherwise the service text is kept as is.
fn clean_output(raw: &str) -> Result<String, ServiceError> {
    let text = strip_context_marker(raw);
    if text.trim().is_empty() {
        Err(ServiceError::Empty)
    } else {
        Ok(text.to_string())
    }
}
