use thiserror::Error;

/// Errors from the segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("chunk budget must be greater than 0 characters")]
    ZeroBudget,
}

/// Errors from a single call to the completion service.
///
/// These are recovered per chunk by the reducer and only escape when the
/// final combine call fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("completion failed: {0}")]
    Failed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("completion timed out after {0} ms")]
    Timeout(u128),

    #[error("completion returned empty output")]
    Empty,
}

/// Batch-level failures of a reduction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("segmentation failed: {0}")]
    Segmentation(#[from] SegmentError),

    #[error("integration failed: {0}")]
    Integration(ServiceError),

    #[error("reduction cancelled")]
    Cancelled,
}

impl ReduceError {
    /// Name of the pipeline stage that failed, for user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            ReduceError::Segmentation(_) => "segmentation",
            ReduceError::Integration(_) => "integration",
            ReduceError::Cancelled => "cancelled",
        }
    }
}
