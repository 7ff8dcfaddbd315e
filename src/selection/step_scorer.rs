//! Step-based scoring — alternate strategy over formatted reasoning.
//!
//! Scores the chain-of-thought *rendering* of an answer rather than its raw
//! text: more steps and longer steps score higher, with a flat bonus for a
//! well-formed header. Independent of the self-consistency strategy and not
//! composed with it.

use tracing::debug;

use crate::provider::Candidate;
use crate::reasoning::{self, COT_HEADER};

use super::{SelectionResult, SelectionStrategy};

const STEP_WEIGHT: f64 = 1.5;
const STEP_LENGTH_WEIGHT: f64 = 0.01;
const HEADER_BONUS: f64 = 2.0;

/// Score already-rendered reasoning text.
///
/// If the first line is the canonical header, the remaining non-empty lines
/// are the steps; otherwise every non-empty line counts. The score is
/// `steps × 1.5 + average step length × 0.01`, plus `2.0` when the text
/// begins with the header.
pub fn score_rendered(rendered: &str) -> f64 {
    let lines: Vec<&str> = rendered.lines().collect();

    let has_header_line = lines
        .first()
        .is_some_and(|l| l.trim().eq_ignore_ascii_case(COT_HEADER));

    let body = if has_header_line { &lines[1..] } else { &lines[..] };
    let steps: Vec<&str> = body.iter().copied().filter(|l| !l.trim().is_empty()).collect();

    let step_count = steps.len();
    let avg_length = if step_count > 0 {
        steps.iter().map(|s| s.len()).sum::<usize>() as f64 / step_count as f64
    } else {
        0.0
    };

    let mut score = step_count as f64 * STEP_WEIGHT + avg_length * STEP_LENGTH_WEIGHT;
    if rendered.starts_with(COT_HEADER) {
        score += HEADER_BONUS;
    }
    score
}

/// Alternate selection strategy: formats each candidate and picks the one
/// whose rendering scores highest. The result carries the winner's *raw*
/// text, like every strategy, so the cleaner still sees unformatted input.
#[derive(Debug, Default)]
pub struct StepCountSelector;

impl SelectionStrategy for StepCountSelector {
    fn select(&self, candidates: &[Candidate], _query: &str) -> SelectionResult {
        if candidates.is_empty() {
            return SelectionResult::empty();
        }

        let mut winner: Option<(usize, f64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let (_, rendered) = reasoning::render(&candidate.raw_text);
            let score = score_rendered(&rendered);
            debug!(provider = %candidate.provider_id, score, "scored formatted candidate");
            // Strictly greater keeps the first occurrence on ties.
            if winner.is_none_or(|(_, best)| score > best) {
                winner = Some((index, score));
            }
        }

        let (index, score) = winner.unwrap_or((0, 0.0));
        SelectionResult {
            text: candidates[index].raw_text.clone(),
            score,
        }
    }
}
