//! Multi-metric quality scoring for a single candidate answer.
//!
//! Each metric contributes independently to a weighted sum. The semantic
//! similarity and grammar metrics are capability-gated: when their backing
//! capability is unavailable they contribute zero, never an error. The
//! baseline "model confidence" estimate is injectable so tests can
//! substitute a deterministic stub and production can plug in a real
//! confidence signal without touching the combination logic.

use std::sync::Arc;

use rand::Rng;
use regex::Regex;

/// Default whole-word keyword set rewarded by the keyword-density metric.
pub const DEFAULT_KEYWORDS: [&str; 7] = [
    "django", "flutter", "api", "model", "python", "dart", "database",
];

const LENGTH_WEIGHT: f64 = 0.01;
const CODE_FENCE_WEIGHT: f64 = 5.0;
const KEYWORD_WEIGHT: f64 = 2.0;

/// Semantic similarity between a response and the query, in `[0, 1]`.
/// Returns `None` when the backing capability (an embedding model) is
/// unavailable.
pub trait SimilarityMetric: Send + Sync {
    fn similarity(&self, response: &str, query: &str) -> Option<f64>;
}

/// Grammar error count for a text. Returns `None` when the backing
/// capability (a grammar checker) is unavailable.
pub trait GrammarMetric: Send + Sync {
    fn error_count(&self, text: &str) -> Option<u32>;
}

/// Baseline quality estimate standing in for model confidence.
pub trait BaselineEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> f64;
}

/// Placeholder baseline: a uniform sample in `[5, 10]`.
#[derive(Debug, Default)]
pub struct UniformBaseline;

impl BaselineEstimator for UniformBaseline {
    fn estimate(&self, _text: &str) -> f64 {
        rand::thread_rng().gen_range(5.0..10.0)
    }
}

/// Deterministic baseline for tests.
#[derive(Debug)]
pub struct FixedBaseline(pub f64);

impl BaselineEstimator for FixedBaseline {
    fn estimate(&self, _text: &str) -> f64 {
        self.0
    }
}

/// Weighted multi-metric scorer for one candidate answer.
pub struct QualityScorer {
    keyword_patterns: Vec<Regex>,
    similarity: Option<Arc<dyn SimilarityMetric>>,
    similarity_weight: f64,
    grammar: Option<Arc<dyn GrammarMetric>>,
    grammar_weight: f64,
    baseline: Arc<dyn BaselineEstimator>,
    baseline_weight: f64,
}

impl QualityScorer {
    /// Scorer with the given keyword set, no similarity or grammar
    /// capability, and the uniform baseline placeholder.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let keyword_patterns = keywords
            .iter()
            .map(|kw| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw.as_ref())))
                    .expect("keyword regex should compile")
            })
            .collect();

        Self {
            keyword_patterns,
            similarity: None,
            similarity_weight: 1.0,
            grammar: None,
            grammar_weight: 1.0,
            baseline: Arc::new(UniformBaseline),
            baseline_weight: 1.0,
        }
    }

    pub fn with_similarity(mut self, metric: Arc<dyn SimilarityMetric>, weight: f64) -> Self {
        self.similarity = Some(metric);
        self.similarity_weight = weight;
        self
    }

    pub fn with_grammar(mut self, metric: Arc<dyn GrammarMetric>, weight: f64) -> Self {
        self.grammar = Some(metric);
        self.grammar_weight = weight;
        self
    }

    pub fn with_baseline(mut self, baseline: Arc<dyn BaselineEstimator>, weight: f64) -> Self {
        self.baseline = baseline;
        self.baseline_weight = weight;
        self
    }

    /// Compute the quality score for one response.
    ///
    /// Sum of: length × 0.01, triple-backtick markers × 5.0, whole-word
    /// keyword occurrences × 2.0, similarity scaled to `[0, 10]` × weight,
    /// grammar `max(0, 10 − errors/5)` × weight, and the baseline estimate
    /// × weight. Gated metrics contribute zero when unavailable.
    pub fn score(&self, response: &str, query: &str) -> f64 {
        let mut total = response.len() as f64 * LENGTH_WEIGHT;

        let fence_markers = response.matches("```").count();
        total += fence_markers as f64 * CODE_FENCE_WEIGHT;

        for pattern in &self.keyword_patterns {
            total += pattern.find_iter(response).count() as f64 * KEYWORD_WEIGHT;
        }

        if let Some(metric) = &self.similarity {
            if let Some(similarity) = metric.similarity(response, query) {
                total += similarity.clamp(0.0, 1.0) * 10.0 * self.similarity_weight;
            }
        }

        if let Some(metric) = &self.grammar {
            if let Some(errors) = metric.error_count(response) {
                let raw = (10.0 - f64::from(errors) / 5.0).max(0.0);
                total += raw * self.grammar_weight;
            }
        }

        total += self.baseline.estimate(response) * self.baseline_weight;

        total
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(&DEFAULT_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_scorer() -> QualityScorer {
        QualityScorer::new(&DEFAULT_KEYWORDS).with_baseline(Arc::new(FixedBaseline(0.0)), 1.0)
    }

    #[test]
    fn test_length_metric() {
        let scorer = deterministic_scorer();
        // 4 chars, no fences, no keywords.
        assert!((scorer.score("wxyz", "q") - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_code_fence_metric() {
        let scorer = deterministic_scorer();
        let with_block = "```\nlet x = 1;\n```";
        let without = "let x = 1;";
        // One fenced block contains two markers: +10.0.
        let delta = scorer.score(with_block, "q") - scorer.score(without, "q");
        let length_delta = (with_block.len() - without.len()) as f64 * 0.01;
        assert!((delta - (10.0 + length_delta)).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_metric_whole_word_case_insensitive() {
        let scorer = deterministic_scorer();
        // "API" matches as a whole word; "apis" must not.
        let base = scorer.score("....", "q");
        let hit = scorer.score("API.", "q") - base;
        assert!((hit - 2.0).abs() < 1e-9, "whole-word match scores 2.0, got {hit}");

        let miss = scorer.score("apis", "q") - base;
        assert!(miss.abs() < 1e-9, "substring must not match, got {miss}");
    }

    #[test]
    fn test_similarity_gated_and_scaled() {
        struct Half;
        impl SimilarityMetric for Half {
            fn similarity(&self, _r: &str, _q: &str) -> Option<f64> {
                Some(0.5)
            }
        }
        struct Unavailable;
        impl SimilarityMetric for Unavailable {
            fn similarity(&self, _r: &str, _q: &str) -> Option<f64> {
                None
            }
        }

        let base = deterministic_scorer().score("text", "q");
        let with_half = deterministic_scorer()
            .with_similarity(Arc::new(Half), 1.0)
            .score("text", "q");
        assert!((with_half - base - 5.0).abs() < 1e-9);

        let gated = deterministic_scorer()
            .with_similarity(Arc::new(Unavailable), 1.0)
            .score("text", "q");
        assert!((gated - base).abs() < 1e-9);
    }

    #[test]
    fn test_grammar_metric_floors_at_zero() {
        struct Errors(u32);
        impl GrammarMetric for Errors {
            fn error_count(&self, _t: &str) -> Option<u32> {
                Some(self.0)
            }
        }

        let base = deterministic_scorer().score("text", "q");

        let few = deterministic_scorer()
            .with_grammar(Arc::new(Errors(5)), 1.0)
            .score("text", "q");
        assert!((few - base - 9.0).abs() < 1e-9);

        // 100 errors would go negative; the metric floors at zero.
        let many = deterministic_scorer()
            .with_grammar(Arc::new(Errors(100)), 1.0)
            .score("text", "q");
        assert!((many - base).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_baseline_in_range() {
        let baseline = UniformBaseline;
        for _ in 0..50 {
            let v = baseline.estimate("text");
            assert!((5.0..10.0).contains(&v));
        }
    }

    #[test]
    fn test_baseline_weight_applied() {
        let scorer =
            QualityScorer::new(&DEFAULT_KEYWORDS).with_baseline(Arc::new(FixedBaseline(8.0)), 0.5);
        let zero =
            QualityScorer::new(&DEFAULT_KEYWORDS).with_baseline(Arc::new(FixedBaseline(0.0)), 1.0);
        let delta = scorer.score("text", "q") - zero.score("text", "q");
        assert!((delta - 4.0).abs() < 1e-9);
    }
}
