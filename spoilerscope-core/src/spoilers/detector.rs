//! Replays a candidate reading order against the dependency graph.

use super::fix::generate_fix;
use super::severity::classify;
use crate::reveals::RevealDependencyGraph;
use crate::types::{
    IntroductionSite, MentionSite, OpeningCandidate, RevealGraphEntry, Scene, SpoilerAnalysis,
    SpoilerViolation,
};
use std::collections::{HashMap, HashSet};

/// Finds reveals a reader would meet before what they depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpoilerDetector;

impl SpoilerDetector {
    pub fn new() -> Self {
        Self
    }

    /// Scenes in the order a reader meets them when `candidate` opens the
    /// book, paired with their authored index.
    pub fn reading_order<'a>(
        &self,
        candidate: &OpeningCandidate,
        scenes: &'a [Scene],
    ) -> Vec<(usize, &'a Scene)> {
        let mut position: HashMap<&str, usize> = HashMap::new();
        for (i, scene) in scenes.iter().enumerate() {
            position.entry(scene.id.as_str()).or_insert(i);
        }

        let mut seen: HashSet<usize> = HashSet::new();
        let mut order: Vec<(usize, &Scene)> = Vec::with_capacity(scenes.len());
        for id in &candidate.scene_ids {
            if let Some(&i) = position.get(id.as_str()) {
                if seen.insert(i) {
                    order.push((i, &scenes[i]));
                }
            }
        }
        if order.is_empty() {
            return order;
        }

        for (i, scene) in scenes.iter().enumerate() {
            if position.get(scene.id.as_str()) == Some(&i) && seen.insert(i) {
                order.push((i, scene));
            }
        }
        order
    }

    /// Replay the reading order and report every premature reveal.
    pub fn detect_spoilers(
        &self,
        candidate: &OpeningCandidate,
        scenes: &[Scene],
        graph: &RevealDependencyGraph,
    ) -> SpoilerAnalysis {
        let order = self.reading_order(candidate, scenes);
        if order.is_empty() {
            tracing::debug!(candidate = %candidate.id, "Candidate names no known scene");
            return SpoilerAnalysis::empty(&candidate.id);
        }

        let scene_index: HashMap<&str, usize> = order.iter().map(|(i, s)| (s.id.as_str(), *i)).collect();
        let mut analysis = SpoilerAnalysis::empty(&candidate.id);
        let mut known: HashSet<&str> = HashSet::new();

        for (read_pos, &(_, scene)) in order.iter().enumerate() {
            for mention in graph.reveals_in_scene(&scene.id) {
                let id = mention.reveal_id.as_str();
                if known.contains(id) {
                    continue;
                }
                let Some(entry) = graph.entry(id) else {
                    continue;
                };

                let missing: Vec<String> = entry
                    .prerequisites
                    .iter()
                    .filter(|p| !known.contains(p.as_str()))
                    .cloned()
                    .collect();
                let reordered = read_pos == 0 && entry.first_exposure_scene_id != scene.id;
                known.insert(id);

                if missing.is_empty() && !reordered {
                    analysis.safe_reveals.push(id.to_string());
                    continue;
                }

                let severity = classify(entry, &missing, graph);
                let missing_entries: Vec<&RevealGraphEntry> =
                    missing.iter().filter_map(|m| graph.entry(m)).collect();
                let fix = generate_fix(scene, &mention.anchor, &mention.entities, entry, &missing_entries);
                let spoiled_dependents = graph
                    .downstream(id)
                    .into_iter()
                    .filter(|d| !known.contains(d.as_str()))
                    .collect();

                tracing::debug!(
                    candidate = %candidate.id,
                    reveal = %id,
                    scene = %scene.id,
                    severity = %severity,
                    missing = missing.len(),
                    reordered,
                    "Premature reveal"
                );

                analysis.severity_counts.record(severity);
                analysis.total_severity_score += severity.weight();
                analysis.violations.push(SpoilerViolation {
                    reveal_id: id.to_string(),
                    reveal_description: entry.description.clone(),
                    mentioned_in: MentionSite {
                        scene_id: scene.id.clone(),
                        anchor: mention.anchor.clone(),
                        quote: mention.anchor.slice(scene).unwrap_or_default().to_string(),
                    },
                    should_reveal_at: IntroductionSite {
                        scene_id: entry.first_exposure_scene_id.clone(),
                        chronological_index: scene_index
                            .get(entry.first_exposure_scene_id.as_str())
                            .copied()
                            .unwrap_or(entry.chronological_index),
                    },
                    severity,
                    spoiled_dependents,
                    fix,
                    missing_prerequisites: missing,
                });
            }
        }

        tracing::info!(
            candidate = %candidate.id,
            violations = analysis.violations.len(),
            safe = analysis.safe_reveals.len(),
            score = analysis.total_severity_score,
            "Spoiler analysis complete"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reveals::RevealExtractor;
    use crate::types::{FixType, Severity};

    fn setup(texts: &[(&str, &str)]) -> (Vec<Scene>, RevealDependencyGraph) {
        crate::logging::init_test();
        let scenes: Vec<Scene> = texts
            .iter()
            .map(|(id, text)| Scene::from_text(id, "c1", text))
            .collect();
        let reveals = RevealExtractor::new().extract_all(&scenes).unwrap();
        let graph = RevealDependencyGraph::build(&reveals, false);
        (scenes, graph)
    }

    #[test]
    fn test_reading_order() {
        let (scenes, _) = setup(&[("s1", "a."), ("s2", "b."), ("s3", "c."), ("s4", "d.")]);
        let candidate = OpeningCandidate::new("c", &["s3", "nope", "s3", "s1"]);
        let ids: Vec<&str> = SpoilerDetector::new()
            .reading_order(&candidate, &scenes)
            .iter()
            .map(|(_, s)| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s3", "s1", "s2", "s4"]);
    }

    #[test]
    fn test_unknown_candidate_is_empty() {
        let (scenes, graph) = setup(&[("s1", "Sarah is the mole.")]);
        let candidate = OpeningCandidate::new("c", &["missing"]);
        let analysis = SpoilerDetector::new().detect_spoilers(&candidate, &scenes, &graph);
        assert_eq!(analysis, SpoilerAnalysis::empty("c"));
    }

    #[test]
    fn test_authored_order_is_clean() {
        let (scenes, graph) = setup(&[
            ("s1", "The virus is engineered."),
            ("s2", "The virus spreads silently."),
        ]);
        let candidate = OpeningCandidate::new("c", &["s1"]);
        let analysis = SpoilerDetector::new().detect_spoilers(&candidate, &scenes, &graph);
        assert!(analysis.violations.is_empty());
        assert_eq!(analysis.safe_reveals.len(), 2);
        assert_eq!(analysis.total_severity_score, 0);
    }

    #[test]
    fn test_virus_scenario() {
        let (scenes, graph) = setup(&[
            ("s1", "The virus is engineered."),
            ("s2", "The virus spreads silently."),
        ]);
        let candidate = OpeningCandidate::new("c", &["s2"]);
        let analysis = SpoilerDetector::new().detect_spoilers(&candidate, &scenes, &graph);

        assert_eq!(analysis.violations.len(), 1);
        let v = &analysis.violations[0];
        assert_eq!(v.mentioned_in.scene_id, "s2");
        assert_eq!(v.mentioned_in.quote, "The virus spreads silently.");
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.missing_prerequisites, vec![graph.entries()[0].id.clone()]);
        assert_eq!(v.should_reveal_at.scene_id, "s2");
        assert_eq!(v.fix.fix_type, FixType::Delete);
        assert_eq!(v.fix.original, "silently");
        assert_eq!(analysis.severity_counts.critical, 1);
        assert_eq!(analysis.total_severity_score, 5);
        // the setup is read later and is safe
        assert_eq!(analysis.safe_reveals, vec![graph.entries()[0].id.clone()]);
    }

    #[test]
    fn test_restated_fact_in_opening_is_reorder_violation() {
        let (scenes, graph) = setup(&[
            ("s1", "Sarah is the mole."),
            ("s2", "Rain falls on the docks. Sarah is the mole."),
        ]);
        let candidate = OpeningCandidate::new("c", &["s2"]);
        let analysis = SpoilerDetector::new().detect_spoilers(&candidate, &scenes, &graph);

        assert_eq!(analysis.violations.len(), 1);
        let v = &analysis.violations[0];
        assert!(v.missing_prerequisites.is_empty());
        assert_eq!(v.should_reveal_at.scene_id, "s1");
        assert_eq!(v.should_reveal_at.chronological_index, 0);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.fix.fix_type, FixType::Replace);
        assert_eq!(v.fix.suggested, "involved");
        assert_eq!(v.fix.anchor.scene_id, "s2");
        assert_eq!(v.fix.anchor.slice(&scenes[1]), Some("mole"));
    }

    #[test]
    fn test_flagged_reveal_counts_as_known() {
        let (scenes, graph) = setup(&[
            ("s1", "Alice is a doctor."),
            ("s2", "Alice became chief."),
            ("s3", "Alice became director."),
        ]);
        let candidate = OpeningCandidate::new("c", &["s3", "s2"]);
        let analysis = SpoilerDetector::new().detect_spoilers(&candidate, &scenes, &graph);

        // s3 misses s2; s2 then misses s1; s1 itself is safe
        let flagged: Vec<&str> = analysis.violations.iter().map(|v| v.mentioned_in.scene_id.as_str()).collect();
        assert_eq!(flagged, vec!["s3", "s2"]);
        assert_eq!(analysis.violations[1].spoiled_dependents, Vec::<String>::new());
        assert_eq!(analysis.safe_reveals.len(), 1);
    }
}
