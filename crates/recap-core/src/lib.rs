pub mod complete;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod http;
pub mod integrate;
pub mod language;
pub mod notes;
pub mod overlap;
pub mod reduce;
pub mod segment;
pub mod text;
pub mod types;

pub use engine::{Assembly, EngineOptions, ReductionEngine};
pub use error::*;
pub use estimate::{SizeEstimator, SizeMetric, estimate_cost};
pub use integrate::{IntegrateOptions, IntegrationStrategy, PartCombiner, integrate};
pub use language::{Language, detect_language, should_translate};
pub use overlap::{find_overlap, merge_sequential, strip_overlap};
pub use reduce::{ChunkProcessor, ReduceOptions, reduce};
pub use segment::segment;
pub use types::*;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
