//! Pattern-based reveal extraction.
//!
//! Scene text is split into sentences and each sentence is matched against an
//! ordered list of patterns. The first pattern that matches produces the
//! sentence's reveal; later patterns are not consulted.

use crate::anchor::checksum;
use crate::error::Result;
use crate::spoilers::{contains_word, IDENTITY_KEYWORDS};
use crate::types::{Reveal, RevealPattern, RevealType, Scene, TextAnchor};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

const NAME: &str = r"[A-Z][\w'\u{2019}-]*(?:[ \t]+[A-Z][\w'\u{2019}-]*)*";

static SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^.!?\n]+[.!?]*["'\u{201D}\u{2019}]?"#).expect("sentence pattern")
});

static PROPER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(NAME).expect("name pattern"));

static RELATIONSHIP_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<a>{NAME})\s+(?:knows|knew|loves|loved|hates|hated|trusts|trusted|betrays|betrayed|marries|married|fears|feared|serves|served|kills|killed|meets|met)\s+(?P<b>{NAME})"
    ))
    .expect("relationship verb pattern")
});

static RELATIONSHIP_KIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<a>{NAME})\s+(?:is|was)\s+(?:the|a|an|his|her|their)\s+(?:sister|brother|mother|father|son|daughter|child|wife|husband|friend|lover|enemy|partner|cousin|ally|rival|mentor)\s+of\s+(?P<b>{NAME})"
    ))
    .expect("relationship kin pattern")
});

static TEMPORAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|twenty|thirty|fifty|a hundred|a few|several|many)\s+(?:years?|months?|weeks?|days?|nights?|hours?|decades?|centuries|century)\s+(?:since|before|after|ago|earlier|later|had passed|have passed)\b",
    )
    .expect("temporal pattern")
});

static STATE_CHANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<subj>[Tt]he\s+[a-z]+|{NAME})\s+(?:became|becomes|has become|had become|turned into|turns into|grew into|is now|was now)\s+(?P<pred>[^.!?;,]+)"
    ))
    .expect("state change pattern")
});

static STATE_ASSERTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<subj>[Tt]he\s+[a-z]+|{NAME})\s+(?:is|was|are|were)\s+(?P<pred>[^.!?;,]+)"
    ))
    .expect("state assertion pattern")
});

static INTRODUCTION_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:named|called|known as)\s+(?P<name>{NAME})"))
        .expect("named introduction pattern")
});

static INTRODUCTION_PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?i:city|town|village|kingdom|empire|planet|island|realm|land|republic|province|valley)\s+of\s+(?P<name>{NAME})"
    ))
    .expect("place introduction pattern")
});

static EVENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[Tt]he\s+(?P<noun>[a-z]+)\s+(?P<verb>[a-z]+(?:s|ed))\b").expect("event pattern")
});

/// Capitalized words that start sentences without naming anyone.
const LEADING_STOPWORDS: &[&str] = &[
    "A", "After", "An", "And", "As", "At", "Before", "But", "Everyone", "He", "Her", "Here", "His",
    "I", "In", "It", "Its", "Later", "Meanwhile", "My", "No", "Nobody", "Now", "On", "Our", "She",
    "So", "Someone", "Still", "That", "The", "Their", "Then", "There", "They", "This", "We",
    "When", "Yet", "You", "Your",
];

/// A pattern hit before it is bound to a scene.
struct Match {
    reveal_type: RevealType,
    pattern: RevealPattern,
    description: String,
    entities: Vec<String>,
    confidence: f32,
}

type Rule = fn(&str) -> Option<Match>;

/// Extraction rules in priority order.
const RULES: [Rule; 6] = [
    relationship,
    temporal,
    state_change,
    state_assertion,
    introduction,
    event,
];

/// Extracts reveals from scene text.
///
/// Stateless: the same scene always yields the same reveals with the same
/// identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevealExtractor;

impl RevealExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the reveals of one scene. `index` is the scene's position in
    /// the input and is only used for error reporting.
    pub fn extract(&self, index: usize, scene: &Scene) -> Result<Vec<Reveal>> {
        scene.validate(index)?;

        let mut reveals: Vec<Reveal> = Vec::new();
        for sentence in SENTENCE.find_iter(&scene.text) {
            let raw = sentence.as_str();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lead = raw.len() - raw.trim_start().len();
            let body = trimmed.trim_start_matches(['"', '\'', '\u{201C}', '\u{2018}']);

            let Some(found) = RULES.iter().find_map(|rule| rule(body)) else {
                continue;
            };

            let id = reveal_id(&scene.id, found.reveal_type, &found.description);
            if reveals.iter().any(|r| r.id == id) {
                continue;
            }

            reveals.push(Reveal {
                id,
                description: found.description,
                reveal_type: found.reveal_type,
                pattern: found.pattern,
                scene_id: scene.id.clone(),
                confidence: found.confidence,
                entities: found.entities,
                anchor: TextAnchor {
                    scene_id: scene.id.clone(),
                    offset: sentence.start() + lead,
                    length: trimmed.len(),
                },
            });
        }

        tracing::trace!(scene = %scene.id, reveals = reveals.len(), "Extracted reveals");
        Ok(reveals)
    }

    /// Extract every scene in order, concatenating the reveals.
    ///
    /// Fails on the first invalid scene or repeated scene identifier.
    pub fn extract_all(&self, scenes: &[Scene]) -> Result<Vec<Reveal>> {
        Scene::validate_all(scenes)?;
        let mut all = Vec::new();
        for (index, scene) in scenes.iter().enumerate() {
            all.extend(self.extract(index, scene)?);
        }
        Ok(all)
    }
}

/// Stable identifier for a reveal.
pub fn reveal_id(scene_id: &str, reveal_type: RevealType, description: &str) -> String {
    let normalized = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = checksum(&format!("{scene_id}\u{1f}{reveal_type}\u{1f}{normalized}"));
    format!("rv-{}", &digest[..16])
}

// ============================================
// Rules
// ============================================

fn relationship(body: &str) -> Option<Match> {
    let caps = RELATIONSHIP_KIN
        .captures(body)
        .or_else(|| RELATIONSHIP_VERB.captures(body))?;
    let a = clean_name(&caps["a"])?;
    let b = clean_name(&caps["b"])?;
    Some(Match {
        reveal_type: RevealType::Relationship,
        pattern: RevealPattern::Relationship,
        description: matched_text(&caps),
        entities: dedup(vec![a, b]),
        confidence: 0.8,
    })
}

fn temporal(body: &str) -> Option<Match> {
    let phrase = TEMPORAL.find(body)?;
    // "Three years since" starts with a capital but names nobody
    let entities = PROPER_NAME
        .find_iter(body)
        .filter(|m| m.end() <= phrase.start() || m.start() >= phrase.end())
        .filter_map(|m| clean_name(m.as_str()))
        .collect();
    Some(Match {
        reveal_type: RevealType::Temporal,
        pattern: RevealPattern::Temporal,
        description: strip_terminal(body),
        entities: dedup(entities),
        confidence: 0.65,
    })
}

fn state_change(body: &str) -> Option<Match> {
    let caps = STATE_CHANGE.captures(body)?;
    state_match(&caps, RevealPattern::StateChange, 0.75)
}

fn state_assertion(body: &str) -> Option<Match> {
    let caps = STATE_ASSERTION.captures(body)?;
    state_match(&caps, RevealPattern::StateAssertion, 0.7)
}

fn state_match(caps: &Captures<'_>, pattern: RevealPattern, confidence: f32) -> Option<Match> {
    let (mut reveal_type, subject) = subject(&caps["subj"])?;
    // "The captain is dead" is about a person, not a plot element
    if reveal_type == RevealType::Plot && names_identity_or_fate(&caps["pred"]) {
        reveal_type = RevealType::Character;
    }
    let mut entities = vec![subject];
    entities.extend(proper_names(&caps["pred"]));
    Some(Match {
        reveal_type,
        pattern,
        description: matched_text(caps),
        entities: dedup(entities),
        confidence,
    })
}

fn introduction(body: &str) -> Option<Match> {
    let (reveal_type, caps) = match INTRODUCTION_NAMED.captures(body) {
        Some(caps) => (RevealType::Character, caps),
        None => (RevealType::World, INTRODUCTION_PLACE.captures(body)?),
    };
    let name = clean_name(&caps["name"])?;
    Some(Match {
        reveal_type,
        pattern: RevealPattern::Introduction,
        description: format!("{name} is introduced"),
        entities: vec![name],
        confidence: 0.6,
    })
}

fn event(body: &str) -> Option<Match> {
    let caps = EVENT.captures(body)?;
    Some(Match {
        reveal_type: RevealType::Plot,
        pattern: RevealPattern::Event,
        description: strip_terminal(body),
        entities: vec![caps["noun"].to_string()],
        confidence: 0.5,
    })
}

// ============================================
// Helpers
// ============================================

/// Classify a sentence subject: `the <noun>` is a plot element, a proper
/// name a character.
fn subject(raw: &str) -> Option<(RevealType, String)> {
    let mut words = raw.split_whitespace();
    let first = words.next()?;
    if first.eq_ignore_ascii_case("the") {
        if let Some(noun) = words.next() {
            if noun.chars().all(|c| c.is_lowercase()) {
                return Some((RevealType::Plot, noun.to_string()));
            }
        }
    }
    clean_name(raw).map(|name| (RevealType::Character, name))
}

/// Whether a predicate exposes who someone really is or what became of them.
fn names_identity_or_fate(predicate: &str) -> bool {
    IDENTITY_KEYWORDS
        .iter()
        .any(|keyword| contains_word(predicate, keyword))
}

/// Drop leading sentence words that are not part of a name.
fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .skip_while(|w| LEADING_STOPWORDS.contains(w))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Proper names in order of appearance, without duplicates.
fn proper_names(text: &str) -> Vec<String> {
    dedup(
        PROPER_NAME
            .find_iter(text)
            .filter_map(|m| clean_name(m.as_str()))
            .collect(),
    )
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn matched_text(caps: &Captures<'_>) -> String {
    caps.get(0)
        .map(|m| strip_terminal(m.as_str()))
        .unwrap_or_default()
}

fn strip_terminal(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| ".!?\"'\u{201D}\u{2019}".contains(c))
        .trim_end()
        .to_string()
}

// ============================================
// Cache
// ============================================

struct CachedScene {
    checksum: String,
    reveals: Vec<Reveal>,
}

/// Per-scene extraction results, keyed by scene identifier.
///
/// An entry is reused only while the scene text is unchanged.
#[derive(Default)]
pub struct ExtractionCache {
    entries: HashMap<String, CachedScene>,
    hits: u64,
    misses: u64,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached reveals for `scene`, extracting on a miss.
    pub fn get_or_extract(
        &mut self,
        extractor: &RevealExtractor,
        index: usize,
        scene: &Scene,
    ) -> Result<Vec<Reveal>> {
        let sum = checksum(&scene.text);
        if let Some(cached) = self.entries.get(&scene.id) {
            if cached.checksum == sum {
                self.hits += 1;
                return Ok(cached.reveals.clone());
            }
        }

        self.misses += 1;
        let reveals = extractor.extract(index, scene)?;
        self.entries.insert(
            scene.id.clone(),
            CachedScene {
                checksum: sum,
                reveals: reveals.clone(),
            },
        );
        Ok(reveals)
    }

    /// Forget one scene. Returns whether it was cached.
    pub fn invalidate(&mut self, scene_id: &str) -> bool {
        self.entries.remove(scene_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl std::fmt::Debug for ExtractionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionCache")
            .field("scenes", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
