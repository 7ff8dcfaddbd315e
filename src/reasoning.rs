//! Chain-of-thought formatting.
//!
//! Reworks a raw provider answer into a numbered step list under a
//! canonical header. Formatting is a derived view: the source candidate is
//! never mutated, and scoring in the primary selection strategy always sees
//! the raw text. Only the step-based strategy consumes the rendered form.

use std::sync::LazyLock;

use regex::Regex;

use crate::provider::Candidate;

/// Canonical header line for formatted reasoning.
pub const COT_HEADER: &str = "Chain of Thought:";

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s+").expect("SENTENCE_SPLIT regex should compile"));

static STEP_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("STEP_NUMBER regex should compile"));

/// Derived, numbered view of a [`Candidate`].
#[derive(Debug, Clone)]
pub struct FormattedCandidate {
    pub provider_id: String,
    /// Ordered reasoning steps. Empty when the text could not be split,
    /// in which case `rendered` falls back to the unnumbered original.
    pub steps: Vec<String>,
    /// Header plus numbered steps, ready for display or step scoring.
    pub rendered: String,
}

/// Format one candidate's raw text into a numbered reasoning trail.
pub fn format(candidate: &Candidate) -> FormattedCandidate {
    let (steps, rendered) = render(&candidate.raw_text);
    FormattedCandidate {
        provider_id: candidate.provider_id.clone(),
        steps,
        rendered,
    }
}

/// Split raw text into steps and render them under the canonical header.
///
/// Idempotent: feeding a rendered output back in strips the header and the
/// step numbering before re-splitting, so the step sequence is unchanged.
pub fn render(raw_text: &str) -> (Vec<String>, String) {
    let mut text = raw_text.trim();

    // Strip an existing header so repeated formatting does not stack.
    let had_header = text.starts_with(COT_HEADER);
    if had_header {
        text = text[COT_HEADER.len()..].trim();
    }

    // Text under our own header carries our own numbering; remove it up
    // front so "1. " is not mistaken for a sentence boundary below.
    let normalized: String = if had_header {
        text.lines()
            .map(|l| STEP_NUMBER.replace(l.trim_start(), "").into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    };
    let text = normalized.as_str();

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let fragments: Vec<String> = if lines.len() <= 1 {
        // Single-line answer: fall back to sentence boundaries.
        SENTENCE_SPLIT.split(text).map(str::to_string).collect()
    } else {
        lines.iter().map(|l| l.to_string()).collect()
    };

    let steps: Vec<String> = fragments
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    if steps.is_empty() {
        return (steps, format!("{COT_HEADER}\n{text}"));
    }

    let numbered: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect();

    let rendered = format!("{COT_HEADER}\n{}", numbered.join("\n"));
    (steps, rendered)
}
