//! Ensemble selection — picking one answer among several candidates.
//!
//! Two interchangeable strategies sit behind [`SelectionStrategy`]:
//!
//! - [`SelfConsistencySelector`]: frequency voting over raw candidate text
//!   combined with a multi-metric quality score (the primary strategy).
//! - [`StepCountSelector`]: scores the chain-of-thought rendering of each
//!   candidate by step count and step length (independent alternate).
//!
//! Both operate on unmodified raw candidate text for the result — cleaning
//! happens once, after selection, on the winner only.

pub mod quality;
pub mod self_consistency;
pub mod step_scorer;

pub use quality::{
    BaselineEstimator, FixedBaseline, GrammarMetric, QualityScorer, SimilarityMetric,
    UniformBaseline, DEFAULT_KEYWORDS,
};
pub use self_consistency::SelfConsistencySelector;
pub use step_scorer::{score_rendered, StepCountSelector};

use crate::provider::Candidate;

/// A candidate paired with its computed score. Transient: exists only
/// while a strategy is ranking a batch.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// The single chosen answer: raw (uncleaned) text plus its final score.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub text: String,
    pub score: f64,
}

impl SelectionResult {
    /// Result for an empty candidate list.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A strategy for choosing one winner from a candidate batch.
///
/// Implementations must be deterministic given deterministic metrics, and
/// must break score ties by first occurrence in input order: the first
/// candidate to reach the maximum score wins, later equal scores never
/// displace it.
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, candidates: &[Candidate], query: &str) -> SelectionResult;
}
