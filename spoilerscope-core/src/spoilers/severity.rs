//! Severity classification for premature reveals.

use crate::reveals::RevealDependencyGraph;
use crate::types::{RevealGraphEntry, RevealType, Severity};

/// Words that expose a character's hidden identity or fate.
pub(crate) const IDENTITY_KEYWORDS: &[&str] = &["mole", "traitor", "killer", "dead"];

/// Missing prerequisites at or above this count make a reveal at least moderate.
const MANY_MISSING: usize = 3;

/// Whether `text` contains `word` as a whole word, ignoring ASCII case.
pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case(word))
}

/// Classify a violation from the revealed fact and what the reader lacks.
pub fn classify(
    entry: &RevealGraphEntry,
    missing: &[String],
    graph: &RevealDependencyGraph,
) -> Severity {
    if entry.reveal_type == RevealType::Character
        && IDENTITY_KEYWORDS
            .iter()
            .any(|k| contains_word(&entry.description, k))
    {
        return Severity::Critical;
    }

    let missing_plot = missing.iter().any(|id| {
        graph
            .entry(id)
            .is_some_and(|e| e.reveal_type == RevealType::Plot)
    });
    if missing_plot {
        return Severity::Critical;
    }

    if matches!(entry.reveal_type, RevealType::Relationship | RevealType::World)
        || missing.len() >= MANY_MISSING
    {
        return Severity::Moderate;
    }

    Severity::Minor
}
