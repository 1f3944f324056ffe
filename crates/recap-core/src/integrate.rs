//! Merges partial outputs into one document.
//!
//! Up to `fan_in` partials are combined in one call. Above that, the
//! hierarchical strategy combines runs of `fan_in` partials concurrently and
//! repeats on the results until a single call covers everything.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::Semaphore;

use crate::error::{ReduceError, ServiceError};
use crate::types::CancelToken;

/// Rewrites a set of `[Part k]`-tagged partials into one coherent text.
#[async_trait]
pub trait PartCombiner: Send + Sync {
    async fn combine(&self, tagged: &str, part_count: usize) -> Result<String, ServiceError>;
}

#[async_trait]
impl<F, Fut> PartCombiner for F
where
    F: Fn(String, usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ServiceError>> + Send + 'static,
{
    async fn combine(&self, tagged: &str, part_count: usize) -> Result<String, ServiceError> {
        (self)(tagged.to_string(), part_count).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStrategy {
    /// Always one combine call, whatever the number of partials.
    Flat,
    /// Combine groups of `fan_in` partials, then combine the group outputs.
    #[default]
    Hierarchical,
}

impl IntegrationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStrategy::Flat => "flat",
            IntegrationStrategy::Hierarchical => "hierarchical",
        }
    }
}

impl std::str::FromStr for IntegrationStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(IntegrationStrategy::Flat),
            "hierarchical" => Ok(IntegrationStrategy::Hierarchical),
            other => Err(format!("unknown integration strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrateOptions {
    pub fan_in: usize,
    pub strategy: IntegrationStrategy,
    pub max_concurrency: usize,
}

impl Default for IntegrateOptions {
    fn default() -> Self {
        Self {
            fan_in: 10,
            strategy: IntegrationStrategy::default(),
            max_concurrency: 5,
        }
    }
}

/// `[Part k]` headers, numbered from `first`, blank-line separated.
pub fn tag_parts<S: AsRef<str>>(parts: &[S], first: usize) -> String {
    parts
        .iter()
        .enumerate()
        .map(|(offset, part)| format!("[Part {}]\n{}", first + offset, part.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Merge `partials` (in position order) into one text through `combiner`.
pub async fn integrate(
    partials: &[String],
    combiner: &dyn PartCombiner,
    options: &IntegrateOptions,
    cancel: &CancelToken,
) -> Result<String, ReduceError> {
    let fan_in = options.fan_in.max(2);
    let mut level: Vec<String> = partials.to_vec();
    let mut depth = 0usize;

    if options.strategy == IntegrationStrategy::Hierarchical {
        let semaphore = Semaphore::new(options.max_concurrency.max(1));
        while level.len() > fan_in {
            if cancel.is_cancelled() {
                return Err(ReduceError::Cancelled);
            }
            depth += 1;
            let groups: Vec<&[String]> = level.chunks(fan_in).collect();
            tracing::info!(
                depth,
                parts = level.len(),
                groups = groups.len(),
                "integrating groups"
            );
            let calls = groups.iter().copied().enumerate().map(|(g, group)| {
                let semaphore = &semaphore;
                async move {
                    if group.len() == 1 {
                        return Ok(group[0].clone());
                    }
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|err| ServiceError::Failed(err.to_string()))?;
                    combiner
                        .combine(&tag_parts(group, g * fan_in + 1), group.len())
                        .await
                }
            });
            level = try_join_all(calls).await.map_err(|err| {
                tracing::error!(depth, error = %err, "group integration failed");
                ReduceError::Integration(err)
            })?;
        }
    }

    if cancel.is_cancelled() {
        return Err(ReduceError::Cancelled);
    }
    tracing::info!(parts = level.len(), "final integration");
    combiner
        .combine(&tag_parts(&level, 1), level.len())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "final integration failed");
            ReduceError::Integration(err)
        })
}
