//! Core domain types for spoilerscope
//!
//! These types are the plain data exchanged between the extraction, graph,
//! detection and anchor layers, and with external collaborators (importers,
//! report renderers, snapshot storage).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Scene** | An ordered slice of the manuscript, produced by an external segmenter |
//! | **Reveal** | A discrete narrative fact found in one scene |
//! | **Fact key** | Type + normalized description; equal keys across scenes are the same fact |
//! | **Candidate** | A proposed opening: scenes promoted to be read first |
//! | **Anchor** | A position inside text, scene-relative ([`TextAnchor`]) or snapshot-based ([`SceneSnap`]) |
//! | **Corridor** | Byte range around a stale offset searched before a global search |
//! | **Shingle** | A short distinctive phrase used as a fingerprint for global search |
//!
//! All offsets are byte offsets into UTF-8 text.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================
// Scenes
// ============================================

/// One scene of the manuscript.
///
/// Immutable once segmented; a re-import regenerates scenes wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique identifier
    pub id: String,
    /// Owning chapter
    #[serde(alias = "chapterId")]
    pub chapter_id: String,
    /// Start byte offset into the normalized manuscript
    #[serde(default, alias = "startOffset")]
    pub start_offset: usize,
    /// End byte offset into the normalized manuscript
    #[serde(default, alias = "endOffset")]
    pub end_offset: usize,
    /// The scene text
    pub text: String,
    /// Word count
    #[serde(default, alias = "wordCount")]
    pub word_count: usize,
    /// Share of the text inside dialogue (0..1)
    #[serde(default, alias = "dialogueRatio")]
    pub dialogue_ratio: f32,
}

impl Scene {
    /// Build a scene from text alone, deriving word count and dialogue ratio.
    ///
    /// Offsets are left at zero; callers that know the manuscript layout set them.
    pub fn from_text(id: &str, chapter_id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            chapter_id: chapter_id.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            text: text.to_string(),
            word_count: text.split_whitespace().count(),
            dialogue_ratio: dialogue_ratio(text),
        }
    }

    /// Reject scenes whose shape cannot be analyzed.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidScene {
                index,
                message: "scene has no identifier".to_string(),
            });
        }
        if self.end_offset < self.start_offset {
            return Err(Error::InvalidScene {
                index,
                message: format!(
                    "end offset {} precedes start offset {}",
                    self.end_offset, self.start_offset
                ),
            });
        }
        Ok(())
    }

    /// Validate every scene and reject repeated identifiers.
    ///
    /// The reported index is the position of the offending scene.
    pub fn validate_all(scenes: &[Scene]) -> Result<()> {
        let mut first_seen: HashMap<&str, usize> = HashMap::with_capacity(scenes.len());
        for (index, scene) in scenes.iter().enumerate() {
            scene.validate(index)?;
            if let Some(first) = first_seen.insert(scene.id.as_str(), index) {
                return Err(Error::InvalidScene {
                    index,
                    message: format!(
                        "duplicate scene identifier '{}' (first used at index {})",
                        scene.id, first
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Fraction of characters that sit between double quotes.
fn dialogue_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let mut inside = false;
    let mut quoted = 0usize;
    for c in text.chars() {
        match c {
            '"' | '\u{201C}' | '\u{201D}' => inside = !inside,
            _ if inside => quoted += 1,
            _ => {}
        }
    }
    quoted as f32 / total as f32
}

/// Input bundle: scenes in authored order plus the candidates to evaluate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manuscript {
    /// Scenes in authored order
    pub scenes: Vec<Scene>,
    /// Opening candidates
    #[serde(default)]
    pub candidates: Vec<OpeningCandidate>,
}

impl Manuscript {
    /// Load a manuscript bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let manuscript: Manuscript = serde_json::from_str(&content)?;
        Ok(manuscript)
    }

    /// Find a candidate by identifier.
    pub fn candidate(&self, id: &str) -> Option<&OpeningCandidate> {
        self.candidates.iter().find(|c| c.id == id)
    }
}

// ============================================
// Reveals
// ============================================

/// Coarse classification of a narrative fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealType {
    Character,
    Plot,
    Relationship,
    Temporal,
    World,
}

impl RevealType {
    /// Returns the identifier used in serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            RevealType::Character => "character",
            RevealType::Plot => "plot",
            RevealType::Relationship => "relationship",
            RevealType::Temporal => "temporal",
            RevealType::World => "world",
        }
    }
}

impl std::fmt::Display for RevealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RevealType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "character" => Ok(RevealType::Character),
            "plot" => Ok(RevealType::Plot),
            "relationship" => Ok(RevealType::Relationship),
            "temporal" => Ok(RevealType::Temporal),
            "world" => Ok(RevealType::World),
            _ => Err(format!("unknown reveal type: {}", s)),
        }
    }
}

/// Which extraction pattern produced a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPattern {
    /// "X is/was Y"
    StateAssertion,
    /// "X became Y", "X is now Y"
    StateChange,
    /// "X loves Y", "X is the sister of Y"
    Relationship,
    /// "three years since ..."
    Temporal,
    /// "a man named X", "the city of X"
    Introduction,
    /// "The virus spreads ..."
    Event,
}

impl RevealPattern {
    /// Whether reveals of this pattern describe an entity's state.
    pub fn is_state(&self) -> bool {
        matches!(self, RevealPattern::StateAssertion | RevealPattern::StateChange)
    }
}

/// A scene-relative position: independent of whole-manuscript offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextAnchor {
    /// Scene the offset is relative to
    pub scene_id: String,
    /// Byte offset into the scene text
    pub offset: usize,
    /// Span length in bytes
    pub length: usize,
}

impl TextAnchor {
    /// The anchored slice of the scene text, if the anchor is still in range.
    pub fn slice<'a>(&self, scene: &'a Scene) -> Option<&'a str> {
        if scene.id != self.scene_id {
            return None;
        }
        let end = self.offset.checked_add(self.length)?;
        scene.text.get(self.offset..end)
    }

    /// Absolute manuscript offset, using the scene's start offset.
    pub fn absolute_offset(&self, scene: &Scene) -> usize {
        scene.start_offset + self.offset
    }
}

/// A discrete narrative fact found in one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reveal {
    /// Stable identifier derived from scene, type and description
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Coarse type
    #[serde(rename = "type")]
    pub reveal_type: RevealType,
    /// Extraction pattern that produced this reveal
    pub pattern: RevealPattern,
    /// Owning scene
    pub scene_id: String,
    /// Extraction confidence (0..1)
    pub confidence: f32,
    /// Entity names mentioned, in order of appearance
    pub entities: Vec<String>,
    /// Where in the scene the fact is stated
    pub anchor: TextAnchor,
}

impl Reveal {
    /// Key under which reveals from different scenes count as the same fact.
    pub fn fact_key(&self) -> String {
        let normalized = self
            .description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        format!("{}:{}", self.reveal_type.as_str(), normalized)
    }

    /// Whether the reveal names the entity (case-insensitive).
    pub fn mentions_entity(&self, entity: &str) -> bool {
        self.entities.iter().any(|e| e.eq_ignore_ascii_case(entity))
    }
}

/// One node of the reveal dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealGraphEntry {
    /// Canonical reveal identifier
    pub id: String,
    /// Description of the fact
    pub description: String,
    /// Coarse type
    #[serde(rename = "type")]
    pub reveal_type: RevealType,
    /// Scene where the fact canonically belongs
    pub first_exposure_scene_id: String,
    /// Position of the fact in authored order
    pub chronological_index: usize,
    /// Immediate prerequisites, in authored order
    pub prerequisites: Vec<String>,
}

// ============================================
// Anchor snapshots
// ============================================

/// A stored span, captured after an analysis pass, to relocate later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnap {
    /// Identifier of the anchored thing (scene boundary, reveal mention, fix point)
    pub id: String,
    /// Truncated SHA-256 hex of the span text
    #[serde(default)]
    pub checksum: String,
    /// Offset where the span was last known to live
    pub offset: usize,
    /// Verbatim span text
    #[serde(default)]
    pub text: Option<String>,
    /// Up to 64 characters immediately before the span
    #[serde(default)]
    pub before: Option<String>,
    /// Up to 64 characters immediately after the span
    #[serde(default)]
    pub after: Option<String>,
    /// Span length in bytes
    #[serde(default)]
    pub length: Option<usize>,
    /// Distinctive multi-word phrases from the span
    #[serde(default)]
    pub shingles: Option<Vec<String>>,
}

/// Which resolution strategy succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveTier {
    /// Unchanged text at the stored offset
    Exact,
    /// Surrounding context matched after churn normalization
    Context,
    /// Token overlap inside the corridor
    Corridor,
    /// Unique rare phrase anywhere in the manuscript
    Shingle,
}

impl ResolveTier {
    /// Tier number, 1 through 4.
    pub fn number(&self) -> u8 {
        match self {
            ResolveTier::Exact => 1,
            ResolveTier::Context => 2,
            ResolveTier::Corridor => 3,
            ResolveTier::Shingle => 4,
        }
    }
}

/// Outcome of relocating a [`SceneSnap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolveResult {
    /// Strategy that succeeded
    pub tier: ResolveTier,
    /// Confidence in (0, 1]
    pub confidence: f32,
    /// Absolute byte position in the current text
    pub position: usize,
}

// ============================================
// Candidates
// ============================================

/// Shape of an opening candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateType {
    /// One scene promoted to the opening
    #[default]
    Single,
    /// Several scenes stitched together
    Composite,
}

/// A proposed alternate opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningCandidate {
    /// Unique identifier
    pub id: String,
    /// Single scene or composite
    #[serde(rename = "type", default)]
    pub candidate_type: CandidateType,
    /// Scenes read first, in order
    #[serde(alias = "sceneIds")]
    pub scene_ids: Vec<String>,
    /// Precomputed heuristic scores (hook, tension, ...); not used by detection
    #[serde(default)]
    pub scores: BTreeMap<String, f32>,
}

impl OpeningCandidate {
    /// Candidate made of the given scenes.
    pub fn new(id: &str, scene_ids: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            candidate_type: if scene_ids.len() > 1 {
                CandidateType::Composite
            } else {
                CandidateType::Single
            },
            scene_ids: scene_ids.iter().map(|s| s.to_string()).collect(),
            scores: BTreeMap::new(),
        }
    }
}

// ============================================
// Violations
// ============================================

/// How badly a premature reveal hurts the reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Critical,
}

impl Severity {
    /// Contribution to `total_severity_score`.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Critical => 5,
            Severity::Moderate => 2,
            Severity::Minor => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Moderate => "moderate",
            Severity::Minor => "minor",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of textual edit a fix proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    Replace,
    Delete,
    Insert,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::Replace => "replace",
            FixType::Delete => "delete",
            FixType::Insert => "insert",
        }
    }
}

/// A minimal anchored edit that defuses a premature reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFix {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    /// Where the edit applies
    pub anchor: TextAnchor,
    /// Text being replaced or deleted (empty for inserts)
    pub original: String,
    /// Replacement or inserted text (empty for deletes)
    pub suggested: String,
    /// Human-readable reason
    pub reason: String,
}

/// Where a reveal was mentioned too early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionSite {
    pub scene_id: String,
    pub anchor: TextAnchor,
    /// Quoted scene text at the anchor
    pub quote: String,
}

/// Where a reveal is properly introduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroductionSite {
    pub scene_id: String,
    /// Index of the scene in authored order
    pub chronological_index: usize,
}

/// A reveal read before the reader has what it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoilerViolation {
    pub reveal_id: String,
    pub reveal_description: String,
    pub mentioned_in: MentionSite,
    pub should_reveal_at: IntroductionSite,
    pub severity: Severity,
    /// Reveals depending on this one, now also compromised
    pub spoiled_dependents: Vec<String>,
    pub fix: SuggestedFix,
    /// Prerequisites unknown to the reader at the mention
    pub missing_prerequisites: Vec<String>,
}

/// Violation counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub moderate: usize,
    pub minor: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Moderate => self.moderate += 1,
            Severity::Minor => self.minor += 1,
        }
    }
}

/// Result of replaying one candidate against the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpoilerAnalysis {
    pub candidate_id: String,
    /// Violations in replay order
    pub violations: Vec<SpoilerViolation>,
    /// Reveals read with all prerequisites known, in replay order
    pub safe_reveals: Vec<String>,
    pub severity_counts: SeverityCounts,
    pub total_severity_score: u32,
}

impl SpoilerAnalysis {
    /// An analysis with nothing to report.
    pub fn empty(candidate_id: &str) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            ..Default::default()
        }
    }
}

// ============================================
// Opening summary
// ============================================

/// Recommendation for a candidate opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Revise,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Revise => "revise",
            Verdict::Reject => "reject",
        }
    }
}

/// Candidate-level summary derived from a [`SpoilerAnalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningAnalysis {
    pub candidate_id: String,
    pub spoiler_count: usize,
    /// Words touched by suggested fixes, as a percentage of the opening's words
    pub edit_burden_percent: f32,
    pub confidence: f32,
    pub verdict: Verdict,
    pub rationale: String,
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_validation() {
        let scene = Scene::from_text("s1", "c1", "Alice is a doctor.");
        assert!(scene.validate(0).is_ok());
        assert_eq!(scene.word_count, 4);

        let mut bad = scene.clone();
        bad.id = "  ".to_string();
        let err = bad.validate(3).unwrap_err();
        assert!(err.to_string().contains("index 3"));

        let mut inverted = scene;
        inverted.start_offset = 10;
        inverted.end_offset = 2;
        assert!(inverted.validate(0).is_err());
    }

    #[test]
    fn test_dialogue_ratio() {
        assert_eq!(dialogue_ratio(""), 0.0);
        assert_eq!(dialogue_ratio("No speech here."), 0.0);
        let ratio = dialogue_ratio("\"Hello\" she said");
        assert!(ratio > 0.2 && ratio < 0.5);
    }

    #[test]
    fn test_reveal_type_roundtrip_names() {
        for t in [
            RevealType::Character,
            RevealType::Plot,
            RevealType::Relationship,
            RevealType::Temporal,
            RevealType::World,
        ] {
            assert_eq!(t.as_str().parse::<RevealType>().unwrap(), t);
        }
        assert!("gossip".parse::<RevealType>().is_err());
    }

    #[test]
    fn test_severity_weights_and_order() {
        assert_eq!(Severity::Critical.weight(), 5);
        assert_eq!(Severity::Moderate.weight(), 2);
        assert_eq!(Severity::Minor.weight(), 1);
        assert!(Severity::Critical > Severity::Moderate);
    }

    #[test]
    fn test_candidate_json_shape() {
        let json = r#"{"id":"c1","type":"composite","scene_ids":["s2","s3"],"scores":{"hook":0.8}}"#;
        let candidate: OpeningCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.candidate_type, CandidateType::Composite);
        assert_eq!(candidate.scene_ids, vec!["s2", "s3"]);

        let minimal: OpeningCandidate =
            serde_json::from_str(r#"{"id":"c2","scene_ids":["s4"]}"#).unwrap();
        assert_eq!(minimal.candidate_type, CandidateType::Single);
        assert!(minimal.scores.is_empty());
    }

    #[test]
    fn test_text_anchor_slice() {
        let scene = Scene::from_text("s1", "c1", "Sarah is the mole.");
        let anchor = TextAnchor {
            scene_id: "s1".to_string(),
            offset: 13,
            length: 4,
        };
        assert_eq!(anchor.slice(&scene), Some("mole"));

        let wrong_scene = TextAnchor {
            scene_id: "s2".to_string(),
            ..anchor
        };
        assert_eq!(wrong_scene.slice(&scene), None);

        let overflowing: TextAnchor =
            serde_json::from_str(&format!(r#"{{"scene_id":"s1","offset":13,"length":{}}}"#, usize::MAX))
                .unwrap();
        assert_eq!(overflowing.slice(&scene), None);
    }

    #[test]
    fn test_duplicate_scene_ids_rejected() {
        let scenes = vec![
            Scene::from_text("s1", "c1", "Alice is a doctor."),
            Scene::from_text("s2", "c1", "The storm breaks."),
            Scene::from_text("s1", "c1", "Sarah is the mole."),
        ];
        let err = Scene::validate_all(&scenes).unwrap_err();
        assert!(matches!(err, Error::InvalidScene { index: 2, .. }));
        assert!(err.to_string().contains("duplicate scene identifier 's1'"));

        assert!(Scene::validate_all(&scenes[..2]).is_ok());
    }

    #[test]
    fn test_scene_accepts_camel_case_fields() {
        let json = r#"{
            "id": "s1",
            "chapterId": "ch1",
            "text": "Mara is a courier.",
            "startOffset": 40,
            "endOffset": 58,
            "wordCount": 4,
            "dialogueRatio": 0.0
        }"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.chapter_id, "ch1");
        assert_eq!(scene.start_offset, 40);
        assert_eq!(scene.end_offset, 58);
        assert_eq!(scene.word_count, 4);

        let candidate: OpeningCandidate =
            serde_json::from_str(r#"{"id":"c1","sceneIds":["s1"]}"#).unwrap();
        assert_eq!(candidate.scene_ids, vec!["s1"]);
    }
}
