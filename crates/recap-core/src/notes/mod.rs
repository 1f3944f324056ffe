//! The three note reductions built on the engine: transcript optimisation,
//! summarisation and translation.

mod fallback;
pub mod prompts;

pub use fallback::fallback_summary;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::complete::{CompletionProvider, CompletionRequest};
use crate::engine::{Assembly, EngineOptions, ReductionEngine};
use crate::error::{ReduceError, ServiceError};
use crate::estimate::SizeMetric;
use crate::integrate::{IntegrateOptions, IntegrationStrategy, PartCombiner};
use crate::language::{Language, detect_language, should_translate};
use crate::overlap::{MIN_OVERLAP_CHARS, OVERLAP_WINDOW_CHARS};
use crate::reduce::{ChunkProcessor, ReduceOptions};
use crate::text::{
    basic_cleanup, clean_summary, enforce_paragraph_length, format_markdown_paragraphs,
    remove_transcript_headings, strip_timestamps_and_meta,
};
use crate::types::{
    CancelToken, Chunk, PlanMode, Reduction, ReductionPlan, strip_context_marker,
};

const SUMMARY_SINGLE_COST: usize = 4_000;
const TRANSLATE_SINGLE_CHARS: usize = 3_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Clean up a raw transcript: fix errors, paragraph it, drop metadata.
    Optimize,
    Summarize {
        language: Language,
        title: Option<String>,
    },
    /// `source: None` detects the input language.
    Translate {
        source: Option<Language>,
        target: Language,
    },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Optimize => "optimize",
            Task::Summarize { .. } => "summarize",
            Task::Translate { .. } => "translate",
        }
    }

    /// Input as the task sends it to the service.
    pub fn prepare(&self, input: &str) -> String {
        match self {
            Task::Optimize => strip_timestamps_and_meta(input),
            _ => input.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotesOptions {
    pub max_chars_per_chunk: usize,
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    pub fan_in: usize,
    pub strategy: IntegrationStrategy,
    pub context_tail_chars: usize,
    pub overlap_window: usize,
    pub min_overlap: usize,
    pub fallback_chars: usize,
    pub paragraph_chars: usize,
}

impl Default for NotesOptions {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: 4_000,
            max_concurrency: 5,
            call_timeout: Duration::from_secs(60),
            fan_in: 10,
            strategy: IntegrationStrategy::Hierarchical,
            context_tail_chars: 100,
            overlap_window: OVERLAP_WINDOW_CHARS,
            min_overlap: MIN_OVERLAP_CHARS,
            fallback_chars: 200,
            paragraph_chars: 400,
        }
    }
}

impl NotesOptions {
    /// Engine configured the way `task` reduces its input.
    pub fn engine_for(&self, task: &Task) -> ReductionEngine {
        let mut engine = EngineOptions {
            metric: SizeMetric::Chars {
                threshold: self.max_chars_per_chunk,
            },
            max_chars_per_chunk: self.max_chars_per_chunk,
            prefer_paragraphs: true,
            context_tail_chars: 0,
            overlap_window: self.overlap_window,
            min_overlap: self.min_overlap,
            reduce: ReduceOptions {
                max_concurrency: self.max_concurrency,
                call_timeout: self.call_timeout,
                fallback_chars: None,
            },
            integrate: IntegrateOptions {
                fan_in: self.fan_in,
                strategy: self.strategy,
                max_concurrency: self.max_concurrency,
            },
        };
        match task {
            Task::Optimize => engine.context_tail_chars = self.context_tail_chars,
            Task::Summarize { .. } => {
                engine.metric = SizeMetric::Cost {
                    threshold: SUMMARY_SINGLE_COST,
                    include_overhead: true,
                };
                engine.reduce.fallback_chars = Some(self.fallback_chars);
            }
            Task::Translate { .. } => {
                engine.metric = SizeMetric::Chars {
                    threshold: TRANSLATE_SINGLE_CHARS.min(self.max_chars_per_chunk),
                };
            }
        }
        ReductionEngine::new(engine)
    }

    /// What a run of `task` would do, without calling the service.
    pub fn plan(&self, task: &Task, input: &str) -> Result<ReductionPlan, ReduceError> {
        self.engine_for(task).plan(&task.prepare(input))
    }
}

/// Result of one note task.
#[derive(Debug, Clone)]
pub struct NoteOutcome {
    pub text: String,
    /// Language of the input as used by the prompts.
    pub language: Language,
    /// `None` when the task had nothing to do (same-language translation).
    pub reduction: Option<Reduction>,
}

/// A task with its language questions answered and input prepared.
#[derive(Debug, Clone, Copy)]
enum Job {
    Optimize { language: Language },
    Summarize { language: Language },
    Translate { source: Language, target: Language },
}

pub struct NoteWriter {
    provider: Arc<dyn CompletionProvider>,
    options: NotesOptions,
}

impl NoteWriter {
    pub fn new(provider: Arc<dyn CompletionProvider>, options: NotesOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &NotesOptions {
        &self.options
    }

    pub fn engine_for(&self, task: &Task) -> ReductionEngine {
        self.options.engine_for(task)
    }

    /// What a run would do, without calling the service.
    pub fn plan(&self, task: &Task, input: &str) -> Result<ReductionPlan, ReduceError> {
        self.options.plan(task, input)
    }

    pub async fn run(
        &self,
        task: &Task,
        input: &str,
        cancel: &CancelToken,
    ) -> Result<NoteOutcome, ReduceError> {
        let prepared = task.prepare(input);
        let job = match task {
            Task::Optimize => Job::Optimize {
                language: detect_language(&prepared),
            },
            Task::Summarize { language, .. } => Job::Summarize {
                language: *language,
            },
            Task::Translate { source, target } => Job::Translate {
                source: source.unwrap_or_else(|| detect_language(&prepared)),
                target: *target,
            },
        };

        if let Job::Translate { source, target } = job
            && !should_translate(source, target)
        {
            tracing::info!(%source, %target, "source and target match, skipping translation");
            return Ok(NoteOutcome {
                text: input.to_string(),
                language: source,
                reduction: None,
            });
        }

        let engine = self.engine_for(task);
        let plan = engine.plan(&prepared)?;
        let processor: Arc<dyn ChunkProcessor> = Arc::new(LlmProcessor {
            provider: Arc::clone(&self.provider),
            job,
            mode: plan.mode,
            paragraph_chars: self.options.paragraph_chars,
        });

        let (reduction, language) = match job {
            Job::Optimize { language } => {
                let mut reduction = engine
                    .execute(plan, processor, Assembly::Sequential, cancel)
                    .await?;
                reduction.text = if reduction.mode == PlanMode::Single && reduction.is_degraded() {
                    basic_cleanup(input)
                } else {
                    let merged = remove_transcript_headings(&reduction.text);
                    format_markdown_paragraphs(&enforce_paragraph_length(
                        &merged,
                        self.options.paragraph_chars,
                    ))
                };
                (reduction, language)
            }
            Job::Summarize { language } => {
                let combiner = LlmCombiner {
                    provider: Arc::clone(&self.provider),
                    language,
                };
                let mut reduction = engine
                    .execute(plan, processor, Assembly::Integrate(&combiner), cancel)
                    .await?;
                let title = match task {
                    Task::Summarize { title, .. } => title.as_deref(),
                    _ => None,
                };
                reduction.text = if reduction.mode == PlanMode::Single && reduction.is_degraded() {
                    fallback_summary(input, language, title)
                } else {
                    let body = clean_summary(&reduction.text);
                    match title {
                        Some(title) => format!("# {title}\n\n{body}"),
                        None => body,
                    }
                };
                (reduction, language)
            }
            Job::Translate { source, .. } => {
                let reduction = engine
                    .execute(plan, processor, Assembly::Concatenate, cancel)
                    .await?;
                (reduction, source)
            }
        };

        Ok(NoteOutcome {
            text: reduction.text.clone(),
            language,
            reduction: Some(reduction),
        })
    }
}

/// Run a blocking completion off the async workers.
async fn complete_blocking(
    provider: &Arc<dyn CompletionProvider>,
    request: CompletionRequest,
) -> Result<String, ServiceError> {
    let provider = Arc::clone(provider);
    tokio::task::spawn_blocking(move || provider.complete(&request))
        .await
        .map_err(|e| ServiceError::Failed(format!("completion task failed: {e}")))?
}

struct LlmProcessor {
    provider: Arc<dyn CompletionProvider>,
    job: Job,
    mode: PlanMode,
    paragraph_chars: usize,
}

#[async_trait]
impl ChunkProcessor for LlmProcessor {
    async fn process(&self, chunk: &Chunk, total_chunks: usize) -> Result<String, ServiceError> {
        let part = (chunk.index + 1, total_chunks);
        let request = match (self.job, self.mode) {
            (Job::Optimize { language }, _) => {
                prompts::optimize(language, &chunk.render(), self.paragraph_chars)
            }
            (Job::Summarize { language }, PlanMode::Single) => {
                prompts::summary_single(language, &chunk.text)
            }
            (Job::Summarize { language }, PlanMode::Chunked) => {
                prompts::summary_chunk(language, &chunk.text, part.0, part.1)
            }
            (Job::Translate { source, target }, PlanMode::Single) => {
                prompts::translate(source, target, &chunk.text, None)
            }
            (Job::Translate { source, target }, PlanMode::Chunked) => {
                prompts::translate(source, target, &chunk.text, Some(part))
            }
        };

        let output = complete_blocking(&self.provider, request).await?;
        match self.job {
            Job::Optimize { .. } => {
                let body = remove_transcript_headings(strip_context_marker(&output));
                Ok(format_markdown_paragraphs(&enforce_paragraph_length(
                    body.trim(),
                    self.paragraph_chars,
                )))
            }
            _ => Ok(output),
        }
    }
}

struct LlmCombiner {
    provider: Arc<dyn CompletionProvider>,
    language: Language,
}

#[async_trait]
impl PartCombiner for LlmCombiner {
    async fn combine(&self, tagged: &str, _part_count: usize) -> Result<String, ServiceError> {
        let request = prompts::summary_integrate(self.language, tagged);
        complete_blocking(&self.provider, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that answers from a closure and records every request.
    struct ScriptedProvider {
        requests: Mutex<Vec<CompletionRequest>>,
        reply: Box<dyn Fn(&CompletionRequest) -> Result<String, ServiceError> + Send + Sync>,
    }

    impl ScriptedProvider {
        fn new(
            reply: impl Fn(&CompletionRequest) -> Result<String, ServiceError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test"
        }

        fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.reply)(request)
        }
    }

    fn writer(provider: Arc<ScriptedProvider>) -> NoteWriter {
        NoteWriter::new(provider, NotesOptions::default())
    }

    #[tokio::test]
    async fn same_language_translation_is_skipped() {
        let provider = ScriptedProvider::new(|_| Ok("unused".into()));
        let task = Task::Translate {
            source: None,
            target: Language::English,
        };
        let outcome = writer(Arc::clone(&provider))
            .run(&task, "plain english text", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "plain english text");
        assert!(outcome.reduction.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn short_summary_is_cleaned_and_titled() {
        let provider =
            ScriptedProvider::new(|_| Ok("## English Summary\n\nThe talk covers Rust.".into()));
        let task = Task::Summarize {
            language: Language::English,
            title: Some("Talk".into()),
        };
        let outcome = writer(Arc::clone(&provider))
            .run(&task, "A short talk about Rust.", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "# Talk\n\nThe talk covers Rust.");
        assert_eq!(provider.calls(), 1);
        let request = provider.requests.lock().unwrap()[0].clone();
        assert_eq!(request.max_tokens, prompts::SUMMARY_SINGLE.max_tokens);
    }

    #[tokio::test]
    async fn failed_single_summary_uses_fallback_page() {
        let provider = ScriptedProvider::new(|_| Err(ServiceError::Network("offline".into())));
        let task = Task::Summarize {
            language: Language::English,
            title: None,
        };
        let outcome = writer(provider)
            .run(&task, "line one\nline two", &CancelToken::new())
            .await
            .unwrap();
        assert!(outcome.text.contains("simplified summary"));
        assert_eq!(outcome.reduction.unwrap().failed_chunks, vec![0]);
    }

    #[tokio::test]
    async fn failed_single_optimize_falls_back_to_basic_cleanup() {
        let provider = ScriptedProvider::new(|_| Err(ServiceError::Empty));
        let outcome = writer(provider)
            .run(
                &Task::Optimize,
                "**[00:00 - 00:03]**\nOne. Two. Three. Four.",
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.text, "One. Two. Three.\n\nFour.");
    }

    #[tokio::test]
    async fn optimize_strips_metadata_before_the_call() {
        let provider = ScriptedProvider::new(|request| {
            assert!(!request.user.contains("Detected Language"));
            Ok("# Transcript\n\nCleaned text.".into())
        });
        let outcome = writer(provider)
            .run(
                &Task::Optimize,
                "**Detected Language:** en\nraw words here",
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.text, "Cleaned text.");
        assert_eq!(outcome.language, Language::English);
    }

    /// Blocking provider slower than the call timeout; tracks overlapping calls.
    struct SlowProvider {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CompletionProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn model(&self) -> &str {
            "test"
        }

        fn complete(&self, _request: &CompletionRequest) -> Result<String, ServiceError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(120));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("翻译".into())
        }
    }

    #[tokio::test]
    async fn timed_out_calls_keep_their_concurrency_slot() {
        let provider = Arc::new(SlowProvider {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let options = NotesOptions {
            max_chars_per_chunk: 100,
            max_concurrency: 1,
            call_timeout: Duration::from_millis(30),
            ..NotesOptions::default()
        };
        let writer = NoteWriter::new(Arc::clone(&provider) as Arc<dyn CompletionProvider>, options);
        let paragraph = "This sentence is written in plain English for a slow translation call.";
        let input = vec![paragraph; 4].join("\n\n");
        let task = Task::Translate {
            source: Some(Language::English),
            target: Language::Chinese,
        };
        let outcome = writer.run(&task, &input, &CancelToken::new()).await.unwrap();
        let reduction = outcome.reduction.unwrap();
        assert_eq!(reduction.failed_chunks, vec![0, 1, 2, 3]);
        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn task_engines_use_task_thresholds() {
        let provider = ScriptedProvider::new(|_| Ok(String::new()));
        let writer = writer(provider);
        let translate = writer.engine_for(&Task::Translate {
            source: None,
            target: Language::Chinese,
        });
        assert_eq!(
            translate.options().metric,
            SizeMetric::Chars { threshold: 3_000 }
        );
        assert_eq!(translate.options().context_tail_chars, 0);
        let optimize = writer.engine_for(&Task::Optimize);
        assert_eq!(optimize.options().context_tail_chars, 100);
        assert_eq!(optimize.options().reduce.fallback_chars, None);
        let summarize = writer.engine_for(&Task::Summarize {
            language: Language::English,
            title: None,
        });
        assert_eq!(summarize.options().reduce.fallback_chars, Some(200));
    }
}
