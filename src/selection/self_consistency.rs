//! Self-consistency selection — frequency voting plus quality scoring.
//!
//! Candidates are grouped by exact byte equality of their raw text; every
//! member of a size-k group earns a base score of `k × 10`, rewarding
//! providers that converge on an identical answer. Grouping is intentionally
//! whitespace- and formatting-sensitive: near-duplicate answers that differ
//! in a single byte vote separately. The quality score from
//! [`QualityScorer`] is added on top, and the strictly highest total wins.

use std::collections::HashMap;

use tracing::debug;

use crate::provider::Candidate;

use super::quality::QualityScorer;
use super::{ScoredCandidate, SelectionResult, SelectionStrategy};

const FREQUENCY_WEIGHT: f64 = 10.0;

/// Primary selection strategy: frequency vote + quality score.
pub struct SelfConsistencySelector {
    scorer: QualityScorer,
}

impl SelfConsistencySelector {
    pub fn new(scorer: QualityScorer) -> Self {
        Self { scorer }
    }
}

impl Default for SelfConsistencySelector {
    fn default() -> Self {
        Self::new(QualityScorer::default())
    }
}

impl SelectionStrategy for SelfConsistencySelector {
    fn select(&self, candidates: &[Candidate], query: &str) -> SelectionResult {
        if candidates.is_empty() {
            return SelectionResult::empty();
        }

        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for candidate in candidates {
            *frequency.entry(candidate.raw_text.as_str()).or_insert(0) += 1;
        }

        let scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|candidate| {
                let group_size = frequency[candidate.raw_text.as_str()];
                let base = group_size as f64 * FREQUENCY_WEIGHT;
                let quality = self.scorer.score(&candidate.raw_text, query);
                let score = base + quality;
                debug!(
                    provider = %candidate.provider_id,
                    group_size,
                    base,
                    quality,
                    score,
                    "scored candidate"
                );
                ScoredCandidate {
                    candidate: candidate.clone(),
                    score,
                }
            })
            .collect();

        // Strictly-greater comparison keeps the first candidate to reach
        // the maximum score; later ties never displace it.
        let mut winner = &scored[0];
        for entry in &scored[1..] {
            if entry.score > winner.score {
                winner = entry;
            }
        }

        SelectionResult {
            text: winner.candidate.raw_text.clone(),
            score: winner.score,
        }
    }
}
