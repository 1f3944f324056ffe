use std::sync::Arc;

use crate::error::ReduceError;
use crate::estimate::{SizeEstimator, SizeMetric};
use crate::integrate::{IntegrateOptions, PartCombiner, integrate};
use crate::overlap::{MIN_OVERLAP_CHARS, OVERLAP_WINDOW_CHARS, merge_sequential};
use crate::reduce::{ChunkProcessor, ReduceOptions, reduce};
use crate::segment::segment;
use crate::text::tail_chars;
use crate::types::{CancelToken, Chunk, PlanMode, Reduction, ReductionPlan};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Single-shot threshold.
    pub metric: SizeMetric,
    pub max_chars_per_chunk: usize,
    pub prefer_paragraphs: bool,
    /// Characters of the previous chunk carried as context. 0 disables.
    pub context_tail_chars: usize,
    pub overlap_window: usize,
    pub min_overlap: usize,
    pub reduce: ReduceOptions,
    pub integrate: IntegrateOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            metric: SizeMetric::default(),
            max_chars_per_chunk: 4_000,
            prefer_paragraphs: true,
            context_tail_chars: 100,
            overlap_window: OVERLAP_WINDOW_CHARS,
            min_overlap: MIN_OVERLAP_CHARS,
            reduce: ReduceOptions::default(),
            integrate: IntegrateOptions::default(),
        }
    }
}

/// How chunk outputs become one document.
#[derive(Clone, Copy)]
pub enum Assembly<'a> {
    /// Reading order; duplicated seams are stripped.
    Sequential,
    /// Blank-line join, nothing else.
    Concatenate,
    /// Rewritten into one narrative by the combiner.
    Integrate(&'a dyn PartCombiner),
}

impl Assembly<'_> {
    fn name(&self) -> &'static str {
        match self {
            Assembly::Sequential => "sequential",
            Assembly::Concatenate => "concatenate",
            Assembly::Integrate(_) => "integrate",
        }
    }
}

/// Entry point: plan, segment, reduce and assemble one document.
#[derive(Debug, Clone, Default)]
pub struct ReductionEngine {
    options: EngineOptions,
    estimator: SizeEstimator,
}

impl ReductionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            estimator: SizeEstimator::default(),
        }
    }

    pub fn with_estimator(mut self, estimator: SizeEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Decide single-shot or chunked and build the chunks. No service calls.
    pub fn plan(&self, document: &str) -> Result<ReductionPlan, ReduceError> {
        let (cost, fits) = self.estimator.fits(document, self.options.metric);
        if document.trim().is_empty() {
            return Ok(ReductionPlan {
                mode: PlanMode::Single,
                cost,
                chunks: Vec::new(),
            });
        }
        if fits {
            tracing::debug!(cost, "document fits a single call");
            return Ok(ReductionPlan {
                mode: PlanMode::Single,
                cost,
                chunks: vec![Chunk::new(0, document)],
            });
        }

        let pieces = segment(
            document,
            self.options.max_chars_per_chunk,
            self.options.prefer_paragraphs,
        )?;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(pieces.len());
        for (index, text) in pieces.into_iter().enumerate() {
            let context_prefix = match (chunks.last(), self.options.context_tail_chars) {
                (Some(previous), n) if n > 0 => Some(tail_chars(&previous.text, n).to_string()),
                _ => None,
            };
            chunks.push(Chunk {
                index,
                text,
                context_prefix,
            });
        }
        tracing::debug!(cost, chunks = chunks.len(), "document split into chunks");
        Ok(ReductionPlan {
            mode: PlanMode::Chunked,
            cost,
            chunks,
        })
    }

    pub async fn run(
        &self,
        document: &str,
        processor: Arc<dyn ChunkProcessor>,
        assembly: Assembly<'_>,
        cancel: &CancelToken,
    ) -> Result<Reduction, ReduceError> {
        let plan = self.plan(document)?;
        self.execute(plan, processor, assembly, cancel).await
    }

    /// Run a plan built by [`ReductionEngine::plan`].
    pub async fn execute(
        &self,
        plan: ReductionPlan,
        processor: Arc<dyn ChunkProcessor>,
        assembly: Assembly<'_>,
        cancel: &CancelToken,
    ) -> Result<Reduction, ReduceError> {
        let mode = plan.mode;
        let chunk_count = plan.chunks.len();
        if chunk_count == 0 {
            return Ok(Reduction {
                text: String::new(),
                mode,
                chunk_count,
                failed_chunks: Vec::new(),
            });
        }

        tracing::info!(
            mode = mode.as_str(),
            chunks = chunk_count,
            cost = plan.cost,
            "reduction started"
        );
        let results = reduce(plan.chunks, processor, &self.options.reduce, cancel).await?;
        let failed_chunks: Vec<usize> = results
            .iter()
            .filter(|result| result.is_fallback())
            .map(|result| result.index)
            .collect();
        let mut parts: Vec<String> = results.into_iter().map(|result| result.text).collect();
        if mode == PlanMode::Chunked {
            for part in &mut parts {
                *part = part.trim().to_string();
            }
        }

        let text = match (mode, assembly) {
            // Single-shot output is returned exactly as the service wrote it.
            (PlanMode::Single, _) => parts.into_iter().next().unwrap_or_default(),
            (PlanMode::Chunked, Assembly::Sequential) => merge_sequential(
                &parts,
                self.options.overlap_window,
                self.options.min_overlap,
            ),
            (PlanMode::Chunked, Assembly::Concatenate) => parts.join("\n\n"),
            (PlanMode::Chunked, Assembly::Integrate(combiner)) => {
                integrate(&parts, combiner, &self.options.integrate, cancel).await?
            }
        };

        tracing::info!(
            mode = mode.as_str(),
            assembly = assembly.name(),
            chunks = chunk_count,
            failed = failed_chunks.len(),
            "reduction finished"
        );
        Ok(Reduction {
            text,
            mode,
            chunk_count,
            failed_chunks,
        })
    }
}
