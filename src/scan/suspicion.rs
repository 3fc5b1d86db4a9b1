//! Heuristic suspicion scoring for content with no explicit pattern match.
//!
//! Two independent scorers, combined `0.4 * char + 0.6 * word`:
//! - Character scorer: the fraction of digit-only n-grams in the text
//!   that look machine-generated (repeated or sequential digit runs), a
//!   density proxy for unformatted numeric identifiers.
//! - Word scorer: presence of sensitive-context word bigrams; a single
//!   hit already crosses half the scale.
//!
//! The word pass is prefiltered with Aho-Corasick over the bigram lead
//! words so clean text skips tokenization entirely.

use crate::config::SuspicionConfig;
use aho_corasick::AhoCorasick;
use anyhow::Result;

/// Adjacent-word phrases that signal sensitive context.
const SENSITIVE_BIGRAMS: &[(&str, &str)] = &[
    ("social", "security"),
    ("credit", "card"),
    ("card", "number"),
    ("bank", "account"),
    ("account", "number"),
    ("routing", "number"),
    ("medical", "record"),
    ("drivers", "license"),
    ("passport", "number"),
    ("tax", "id"),
];

pub struct SuspicionAnalyzer {
    ngram_len: usize,
    keyword_prefilter: AhoCorasick,
}

impl SuspicionAnalyzer {
    pub fn new(config: &SuspicionConfig) -> Result<Self> {
        let mut lead_words: Vec<&str> = SENSITIVE_BIGRAMS.iter().map(|(a, _)| *a).collect();
        lead_words.sort_unstable();
        lead_words.dedup();
        let keyword_prefilter = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&lead_words)?;
        Ok(Self {
            ngram_len: config.char_ngram_len,
            keyword_prefilter,
        })
    }

    /// Combined suspicion score in [0.0, 1.0].
    pub fn score(&self, text: &str) -> f64 {
        0.4 * self.char_score(text) + 0.6 * self.word_score(text)
    }

    /// Fraction of digit-only n-grams that are repeated or sequential
    /// runs. Returns 0.0 when the text holds no digit n-grams at all.
    pub fn char_score(&self, text: &str) -> f64 {
        let bytes = text.as_bytes();
        if bytes.len() < self.ngram_len {
            return 0.0;
        }
        let mut total = 0u64;
        let mut matched = 0u64;
        for window in bytes.windows(self.ngram_len) {
            if !window.iter().all(u8::is_ascii_digit) {
                continue;
            }
            total += 1;
            if is_patterned_digits(window) {
                matched += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        matched as f64 / total as f64
    }

    /// `min(1.0, 0.5 + 0.2 * hits)` over sensitive word bigrams; 0.0
    /// when no bigram is present.
    pub fn word_score(&self, text: &str) -> f64 {
        if !self.keyword_prefilter.is_match(text) {
            return 0.0;
        }
        let words: Vec<String> = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        let mut hits = 0usize;
        for pair in words.windows(2) {
            if SENSITIVE_BIGRAMS
                .iter()
                .any(|(a, b)| pair[0] == *a && pair[1] == *b)
            {
                hits += 1;
            }
        }
        if hits == 0 {
            return 0.0;
        }
        (0.5 + 0.2 * hits as f64).min(1.0)
    }
}

/// Repeated digit (`777`), ascending run (`456`), or descending run
/// (`321`), wrapping at the decade boundary (`901`).
fn is_patterned_digits(window: &[u8]) -> bool {
    let all_same = window.windows(2).all(|p| p[0] == p[1]);
    let ascending = window
        .windows(2)
        .all(|p| (p[0] - b'0' + 1) % 10 == p[1] - b'0');
    let descending = window
        .windows(2)
        .all(|p| (p[1] - b'0' + 1) % 10 == p[0] - b'0');
    all_same || ascending || descending
}
