//! Final response normalization.
//!
//! A pure, deterministic cleanup pass applied exactly once, to the selection
//! winner only. Scoring and formatting always operate on the unmodified raw
//! text, so markdown fences, whitespace variance, and sentinel prefixes
//! still influence selection — only the returned answer is cleaned.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").expect("ENTITY regex should compile")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("HTML_TAG regex should compile"));

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("SPACE_RUN regex should compile"));

static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s*\n\s*)+").expect("BLANK_LINE_RUN regex should compile"));

static PUNCT_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?])").expect("PUNCT_SPACE regex should compile"));

static ERROR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Error:\s*").expect("ERROR_PREFIX regex should compile"));

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

fn unescape_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(body)
        };
        match decoded {
            Some(c) => c.to_string(),
            // Unknown entity: leave it untouched.
            None => caps[0].to_string(),
        }
    })
}

/// Normalize a selected answer for delivery.
///
/// In order: trim, unescape HTML entities, strip HTML-tag-like substrings,
/// collapse runs of horizontal whitespace to one space, collapse blank-line
/// runs to one newline, remove whitespace before `,` `.` `!` `?`, and strip
/// one leading case-insensitive `Error:` token. Note that only the token is
/// stripped — on an all-failed batch the failure detail after the sentinel
/// remains visible in the final answer.
pub fn clean(response_text: &str) -> String {
    let text = response_text.trim();
    let text = unescape_entities(text);
    let text = HTML_TAG.replace_all(&text, "");
    let text = SPACE_RUN.replace_all(&text, " ");
    let text = BLANK_LINE_RUN.replace_all(&text, "\n");
    let text = PUNCT_SPACE.replace_all(&text, "$1");
    ERROR_PREFIX.replace(&text, "").into_owned()
}
