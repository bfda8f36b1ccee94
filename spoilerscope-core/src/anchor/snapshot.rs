//! Capturing [`SceneSnap`] records and picking shingles.

use super::normalize::{head_chars, tail_chars, tokens, Normalized};
use crate::types::SceneSnap;
use sha2::{Digest, Sha256};

/// Characters of context kept on each side of a span.
pub const CONTEXT_CHARS: usize = 64;

/// Words per shingle.
pub const SHINGLE_WORDS: usize = 4;

/// Shingles kept per snapshot.
pub const MAX_SHINGLES: usize = 5;

/// Words too common to make a phrase distinctive.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "him", "his", "i", "in", "is", "it", "its", "me", "my", "not", "of", "on", "or",
    "she", "so", "that", "the", "their", "them", "then", "there", "they", "this", "to", "was",
    "we", "were", "with", "you",
];

/// Returns a 32-character hex digest of SHA-256(text)
pub fn checksum(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();

    // Take first 16 bytes (32 hex chars)
    hex::encode(&result[..16])
}

/// Pick the most distinctive phrases of `text`.
///
/// Phrases are `SHINGLE_WORDS` consecutive words (fewer for short spans,
/// minimum two), taken verbatim from the normalized, lowercased text so
/// punctuation between words is preserved. Ranked by the number of
/// non-stopword characters; ties keep the earlier phrase.
pub fn extract_shingles(text: &str, limit: usize) -> Vec<String> {
    let normalized = Normalized::new(text, 0, true).text;
    let words = tokens(&normalized);
    if words.len() < 2 {
        return Vec::new();
    }

    let width = SHINGLE_WORDS.min(words.len());
    let mut scored: Vec<(usize, usize, String)> = words
        .windows(width)
        .enumerate()
        .map(|(i, window)| {
            let score = window
                .iter()
                .filter(|(_, w)| !STOPWORDS.contains(&w.as_str()))
                .map(|(_, w)| w.chars().count())
                .sum::<usize>();
            let (start, _) = window[0];
            let (last_start, last_word) = &window[width - 1];
            let end = last_start + last_word.len();
            let phrase = normalized.get(start..end).unwrap_or_default().to_string();
            (score, i, phrase)
        })
        .filter(|(score, _, phrase)| *score > 0 && !phrase.is_empty())
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut picked: Vec<String> = Vec::new();
    for (_, _, phrase) in scored {
        if picked.len() >= limit {
            break;
        }
        if !picked.contains(&phrase) {
            picked.push(phrase);
        }
    }
    picked
}

impl SceneSnap {
    /// Record the span `text[offset..offset + length]` for later relocation.
    ///
    /// Returns `None` when the span is out of range or not on character
    /// boundaries.
    pub fn capture(id: &str, text: &str, offset: usize, length: usize) -> Option<Self> {
        let end = offset.checked_add(length)?;
        let span = text.get(offset..end)?;

        let before = tail_chars(&text[..offset], CONTEXT_CHARS);
        let after = head_chars(&text[end..], CONTEXT_CHARS);
        let shingles = extract_shingles(span, MAX_SHINGLES);

        Some(Self {
            id: id.to_string(),
            checksum: checksum(span),
            offset,
            text: Some(span.to_string()),
            before: (!before.is_empty()).then(|| before.to_string()),
            after: (!after.is_empty()).then(|| after.to_string()),
            length: Some(length),
            shingles: (!shingles.is_empty()).then_some(shingles),
        })
    }

    /// Length of the stored span, from `length` or the stored text.
    pub fn span_len(&self) -> Option<usize> {
        self.length.or_else(|| self.text.as_ref().map(|t| t.len()))
    }
}
