//! Rule-based prompt compression
//!
//! Three tiers keyed off the compression level:
//! - always: whitespace collapse and filler-phrase removal
//! - `level > 0.5`: circumlocutions rewritten to shorter forms
//! - `level > 0.8`: articles and auxiliary verbs stripped (lossy, may break grammar)
//!
//! Every rule only deletes text or swaps a phrase for a shorter one, so the
//! output is never longer than the input.

use super::splitter::{RecursiveCharacterSplitter, SplitterError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static FILLER_PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:please|kindly|you are requested to|i would like you to|make sure to|and also|furthermore|moreover|additionally|basically|actually|really|very)\b",
    )
    .expect("valid regex")
});

static CIRCUMLOCUTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bin order to\b", "to"),
        (r"(?i)\bwith regard to\b", "regarding"),
        (r"(?i)\bwith respect to\b", "regarding"),
        (r"(?i)\bdue to the fact that\b", "because"),
        (r"(?i)\bat this point in time\b", "now"),
        (r"(?i)\bfor the purpose of\b", "for"),
        (r"(?i)\bit is important to note that\b", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

static ARTICLES_AND_AUXILIARIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:will be|can be|the|a|an|is|are)\b").expect("valid regex")
});

/// Settings for the chunked second pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Texts longer than this get the chunked pass
    pub advanced_min_chars: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            advanced_min_chars: 500,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Compress a prompt at the given level (0.0 - 1.0)
pub fn compress_text(text: &str, level: f64) -> String {
    let mut result = collapse_whitespace(text);
    result = remove_until_stable(&result, &FILLER_PHRASES);

    if level > 0.5 {
        for (pattern, replacement) in CIRCUMLOCUTIONS.iter() {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
        result = collapse_whitespace(&result);
        // A rewrite can expose a new filler match
        result = remove_until_stable(&result, &FILLER_PHRASES);
    }

    if level > 0.8 {
        result = remove_until_stable(&result, &ARTICLES_AND_AUXILIARIES);
    }

    result
}

/// Basic compression followed by a chunk-and-rejoin pass for long texts.
///
/// Falls back to the basic result if the splitter cannot be built or the
/// rejoined text comes out longer.
pub fn compress_text_advanced(text: &str, level: f64, settings: &CompressionSettings) -> String {
    let basic = compress_text(text, level);
    if text.chars().count() <= settings.advanced_min_chars {
        return basic;
    }

    match rechunk(&basic, settings) {
        Ok(rechunked) if rechunked.len() <= basic.len() => {
            debug!(
                "Chunked pass reduced {} -> {} chars",
                basic.len(),
                rechunked.len()
            );
            rechunked
        }
        Ok(_) => basic,
        Err(e) => {
            warn!("Chunked compression failed, using basic result: {}", e);
            basic
        }
    }
}

fn rechunk(text: &str, settings: &CompressionSettings) -> Result<String, SplitterError> {
    let splitter = RecursiveCharacterSplitter::new(settings.chunk_size, settings.chunk_overlap)?;

    let mut joined = String::with_capacity(text.len());
    let mut covered = 0;

    for span in splitter.split_spans(text) {
        // Skip the overlap already emitted with the previous chunk
        let start = span.start.max(covered);
        if start >= span.end {
            continue;
        }
        if start > covered && !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(&text[start..span.end]);
        covered = span.end;
    }

    Ok(collapse_whitespace(&joined))
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Remove matches repeatedly until none remain, so the result is a fixpoint
fn remove_until_stable(text: &str, pattern: &Regex) -> String {
    let mut current = text.to_string();
    loop {
        let next = collapse_whitespace(&pattern.replace_all(&current, ""));
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_fillers() {
        let text = "  Please   kindly\n\nsummarize this document  ";
        assert_eq!(compress_text(text, 0.0), "summarize this document");
    }

    #[test]
    fn test_filler_removal_is_idempotent() {
        // Removing "kindly" exposes "and also"
        let text = "Read it and kindly also check it";
        let once = compress_text(text, 0.0);
        assert_eq!(once, "Read it check it");
        assert_eq!(compress_text(&once, 0.0), once);
    }

    #[test]
    fn test_circumlocutions_need_level_above_half() {
        let text = "Summarize in order to help with regard to billing";
        assert_eq!(compress_text(text, 0.5), text);
        assert_eq!(
            compress_text(text, 0.6),
            "Summarize to help regarding billing"
        );
    }

    #[test]
    fn test_aggressive_strips_articles() {
        let text = "The answer is a short summary of the document";
        assert_eq!(compress_text(text, 0.9), "answer short summary of document");
        // Words that merely contain articles survive
        assert_eq!(compress_text("Theory and another", 0.9), "Theory and another");
    }

    #[test]
    fn test_never_grows() {
        let samples = [
            "",
            "   ",
            "Please, in order to answer, it is important to note that the user is here.",
            "a an the is are will be can be",
            "Ünïcödé   text\twith\ttabs and very long words",
        ];
        for sample in samples {
            for level in [0.0, 0.3, 0.5, 0.8, 1.0] {
                let out = compress_text(sample, level);
                assert!(out.len() <= sample.len(), "{:?} grew at {}", sample, level);
            }
        }
    }

    #[test]
    fn test_advanced_short_text_matches_basic() {
        let settings = CompressionSettings::default();
        let text = "Please summarize the text";
        assert_eq!(compress_text_advanced(text, 0.5, &settings), compress_text(text, 0.5));
    }

    fn sentences(text: &str) -> Vec<&str> {
        text.split_inclusive(". ").map(str::trim).collect()
    }

    #[test]
    fn test_advanced_keeps_repeated_sentences() {
        let settings = CompressionSettings::default();
        let sentence = "Please analyze the customer message and extract the key intent. ";
        let text = sentence.repeat(20);

        let basic = compress_text(&text, 0.5);
        let advanced = compress_text_advanced(&text, 0.5, &settings);

        assert_eq!(sentences(&advanced).len(), 20);
        assert_eq!(advanced, basic);
    }

    #[test]
    fn test_advanced_keeps_distinct_paragraphs() {
        let settings = CompressionSettings {
            chunk_size: 120,
            chunk_overlap: 40,
            ..Default::default()
        };
        let text = (0..30)
            .map(|i| format!("Step {} kindly checks field number {} of the record.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n");

        let basic = compress_text(&text, 0.5);
        let advanced = compress_text_advanced(&text, 0.5, &settings);

        assert_eq!(advanced, basic);
        for i in 0..30 {
            assert!(advanced.contains(&format!("Step {} checks field number {} ", i, i)));
        }
    }

    #[test]
    fn test_advanced_keeps_unbroken_text() {
        let settings = CompressionSettings {
            chunk_size: 50,
            chunk_overlap: 10,
            ..Default::default()
        };
        let text = "x".repeat(600);
        assert_eq!(compress_text_advanced(&text, 0.5, &settings), text);
    }

    #[test]
    fn test_advanced_falls_back_on_bad_settings() {
        let settings = CompressionSettings {
            chunk_size: 10,
            chunk_overlap: 20,
            ..Default::default()
        };
        let text = "Please summarize. ".repeat(40);
        assert_eq!(
            compress_text_advanced(&text, 0.5, &settings),
            compress_text(&text, 0.5)
        );
    }
}
