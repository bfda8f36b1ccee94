//! Minimal fixes for premature reveals.
//!
//! In order of preference: soften an identity word, drop a descriptive word,
//! or insert a placeholder asking for bridging context.

use crate::types::{FixType, RevealGraphEntry, Scene, SuggestedFix, TextAnchor};
use once_cell::sync::Lazy;
use regex::Regex;

/// Revealing words and their softer stand-ins, tried in this order.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("mole", "involved"),
    ("traitor", "concerned"),
    ("engineered", "dangerous"),
    ("dead", "missing"),
    ("killer", "suspicious"),
];

const DESCRIPTIVE_SUFFIXES: &[&str] = &[
    "ly", "ed", "ous", "ful", "ive", "less", "ing", "al", "ic", "ent", "ant",
];

const MIN_DESCRIPTIVE_LEN: usize = 5;

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'\u{2019}]*").expect("word pattern"));

/// First whole-word, ASCII case-insensitive occurrence of `word`.
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let lower = haystack.to_ascii_lowercase();
    lower.match_indices(word).map(|(at, _)| at).find(|&at| {
        let before = lower[..at].chars().next_back();
        let after = lower[at + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Match the capitalization of the word being replaced.
fn match_case(original: &str, replacement: &str) -> String {
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

fn is_entity_word(word: &str, entities: &[String]) -> bool {
    entities
        .iter()
        .flat_map(|e| e.split_whitespace())
        .any(|part| part.eq_ignore_ascii_case(word))
}

fn is_descriptive(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.chars().count() >= MIN_DESCRIPTIVE_LEN
        && DESCRIPTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Propose the smallest edit to the mention at `anchor` that defuses `entry`.
///
/// `missing` holds the entries the reader lacks; it only shapes the
/// placeholder text.
pub fn generate_fix(
    scene: &Scene,
    anchor: &TextAnchor,
    entities: &[String],
    entry: &RevealGraphEntry,
    missing: &[&RevealGraphEntry],
) -> SuggestedFix {
    let sentence = anchor.slice(scene).unwrap_or_default();
    let span = |offset: usize, length: usize| TextAnchor {
        scene_id: scene.id.clone(),
        offset: anchor.offset + offset,
        length,
    };

    for (term, replacement) in REPLACEMENTS {
        if let Some(at) = find_word(sentence, term) {
            let original = &sentence[at..at + term.len()];
            return SuggestedFix {
                fix_type: FixType::Replace,
                anchor: span(at, term.len()),
                original: original.to_string(),
                suggested: match_case(original, replacement),
                reason: format!("Soften '{}' so \"{}\" is not stated outright", original, entry.description),
            };
        }
    }

    let descriptive = WORD
        .find_iter(sentence)
        .find(|m| is_descriptive(m.as_str()) && !is_entity_word(m.as_str(), entities));
    if let Some(word) = descriptive {
        return SuggestedFix {
            fix_type: FixType::Delete,
            anchor: span(word.start(), word.len()),
            original: word.as_str().to_string(),
            suggested: String::new(),
            reason: format!(
                "Remove '{}' to weaken \"{}\" before its setup",
                word.as_str(),
                entry.description
            ),
        };
    }

    let context = if missing.is_empty() {
        "the surrounding context".to_string()
    } else {
        missing
            .iter()
            .map(|m| m.description.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };
    SuggestedFix {
        fix_type: FixType::Insert,
        anchor: span(0, 0),
        original: String::new(),
        suggested: format!("[Bridge: establish {}] ", context),
        reason: format!("Set up \"{}\" before it is revealed here", entry.description),
    }
}
