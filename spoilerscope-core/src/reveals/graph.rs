//! Reveal dependency graph
//!
//! The graph is an adjacency map from each canonical reveal to its immediate
//! prerequisites. Reveals that restate an earlier fact (same fact key) are
//! folded into the earliest one and remembered as aliases.
//!
//! Edges are inferred heuristically, or replaced by external suggestions, and
//! the result is always made acyclic before it is exposed.

use super::enrich::DependencySuggestion;
use crate::error::{Error, Result};
use crate::types::{Reveal, RevealGraphEntry, RevealPattern, TextAnchor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// An edge removed to break a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenEdge {
    pub dependent: String,
    pub prerequisite: String,
}

/// A fact stated in a scene, resolved to its canonical reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMention {
    /// Canonical reveal id
    pub reveal_id: String,
    /// Where this scene states the fact
    pub anchor: TextAnchor,
    /// Entities named by this scene's statement
    pub entities: Vec<String>,
}

/// Prerequisite structure over the canonical reveals of a manuscript.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevealDependencyGraph {
    /// One entry per canonical reveal, in chronological order
    entries: Vec<RevealGraphEntry>,
    /// Edges dropped while breaking cycles
    broken_edges: Vec<BrokenEdge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// Every known reveal id (canonical or alias) to its canonical id
    #[serde(skip)]
    canonical: HashMap<String, String>,
    /// Facts stated by each scene, in text order
    #[serde(skip)]
    by_scene: HashMap<String, Vec<SceneMention>>,
}

/// Reveals folded by fact key.
struct Canonical<'a> {
    reveals: Vec<&'a Reveal>,
    /// Scenes mentioning each canonical reveal, first one first
    scenes: Vec<Vec<String>>,
    canonical: HashMap<String, String>,
    by_scene: HashMap<String, Vec<SceneMention>>,
}

impl<'a> Canonical<'a> {
    fn new(reveals: &'a [Reveal]) -> Self {
        let mut canon = Canonical {
            reveals: Vec::new(),
            scenes: Vec::new(),
            canonical: HashMap::new(),
            by_scene: HashMap::new(),
        };
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for reveal in reveals {
            if canon.canonical.contains_key(&reveal.id) {
                continue;
            }
            let idx = *by_key.entry(reveal.fact_key()).or_insert_with(|| {
                canon.reveals.push(reveal);
                canon.scenes.push(Vec::new());
                canon.reveals.len() - 1
            });
            let canonical_id = canon.reveals[idx].id.clone();

            if !canon.scenes[idx].contains(&reveal.scene_id) {
                canon.scenes[idx].push(reveal.scene_id.clone());
            }
            let scene = canon.by_scene.entry(reveal.scene_id.clone()).or_default();
            if !scene.iter().any(|m| m.reveal_id == canonical_id) {
                scene.push(SceneMention {
                    reveal_id: canonical_id.clone(),
                    anchor: reveal.anchor.clone(),
                    entities: reveal.entities.clone(),
                });
            }
            canon.canonical.insert(reveal.id.clone(), canonical_id);
        }
        canon
    }

    fn position(&self, id: &str) -> Option<usize> {
        let canonical = self.canonical.get(id)?;
        self.reveals.iter().position(|r| &r.id == canonical)
    }
}

impl RevealDependencyGraph {
    /// Build the graph from reveals in authored order.
    ///
    /// In fast mode inference is skipped: every reveal depends on all the
    /// reveals before it.
    pub fn build(reveals: &[Reveal], fast_mode: bool) -> Self {
        let canon = Canonical::new(reveals);
        let edges = infer_edges(&canon.reveals, fast_mode);
        Self::assemble(canon, edges, HashMap::new())
    }

    /// Build the graph, letting `suggestions` replace the inferred
    /// prerequisites of the reveals they name.
    ///
    /// Fails without building anything if a suggestion names an unknown
    /// reveal; the caller decides whether to fall back.
    pub fn build_with_suggestions(
        reveals: &[Reveal],
        fast_mode: bool,
        suggestions: &[DependencySuggestion],
    ) -> Result<Self> {
        let canon = Canonical::new(reveals);
        let mut edges = infer_edges(&canon.reveals, fast_mode);
        let mut exposure: HashMap<usize, String> = HashMap::new();

        let mut replaced: Vec<(usize, Vec<usize>)> = Vec::with_capacity(suggestions.len());
        for suggestion in suggestions {
            let target = canon.position(&suggestion.reveal_id).ok_or_else(|| {
                Error::Enrichment(format!("unknown reveal '{}'", suggestion.reveal_id))
            })?;
            let mut prereqs = suggestion
                .prerequisites
                .iter()
                .map(|id| {
                    canon.position(id).ok_or_else(|| {
                        Error::Enrichment(format!(
                            "unknown prerequisite '{}' for reveal '{}'",
                            id, suggestion.reveal_id
                        ))
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            prereqs.retain(|&p| p != target);
            prereqs.sort_unstable();
            prereqs.dedup();
            replaced.push((target, prereqs));

            if let Some(scene) = &suggestion.proper_introduction {
                if canon.scenes[target].contains(scene) {
                    exposure.insert(target, scene.clone());
                }
            }
        }
        for (target, prereqs) in replaced {
            edges[target] = prereqs;
        }

        Ok(Self::assemble(canon, edges, exposure))
    }

    fn assemble(canon: Canonical<'_>, mut edges: Vec<Vec<usize>>, exposure: HashMap<usize, String>) -> Self {
        let removed = break_cycles(&mut edges);
        let ids: Vec<&str> = canon.reveals.iter().map(|r| r.id.as_str()).collect();

        let broken_edges: Vec<BrokenEdge> = removed
            .into_iter()
            .map(|(d, p)| BrokenEdge {
                dependent: ids[d].to_string(),
                prerequisite: ids[p].to_string(),
            })
            .collect();
        for edge in &broken_edges {
            tracing::warn!(
                dependent = %edge.dependent,
                prerequisite = %edge.prerequisite,
                "Removed edge to break dependency cycle"
            );
        }

        let entries: Vec<RevealGraphEntry> = canon
            .reveals
            .iter()
            .enumerate()
            .map(|(i, reveal)| RevealGraphEntry {
                id: reveal.id.clone(),
                description: reveal.description.clone(),
                reveal_type: reveal.reveal_type,
                first_exposure_scene_id: exposure
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| reveal.scene_id.clone()),
                chronological_index: i,
                prerequisites: edges[i].iter().map(|&p| ids[p].to_string()).collect(),
            })
            .collect();

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        tracing::debug!(
            entries = entries.len(),
            aliases = canon.canonical.len() - entries.len(),
            edges = edges.iter().map(Vec::len).sum::<usize>(),
            broken = broken_edges.len(),
            "Assembled reveal dependency graph"
        );

        Self {
            entries,
            broken_edges,
            index,
            canonical: canon.canonical,
            by_scene: canon.by_scene,
        }
    }

    /// All entries in chronological order.
    pub fn entries(&self) -> &[RevealGraphEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical id for any reveal id, alias or not.
    pub fn canonical_id(&self, id: &str) -> Option<&str> {
        self.canonical.get(id).map(String::as_str)
    }

    /// Entry for a reveal id, alias or not.
    pub fn entry(&self, id: &str) -> Option<&RevealGraphEntry> {
        let canonical = self.canonical_id(id)?;
        self.index.get(canonical).map(|&i| &self.entries[i])
    }

    /// Immediate prerequisites; empty for unknown ids.
    pub fn prerequisites(&self, id: &str) -> &[String] {
        self.entry(id)
            .map(|e| e.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    /// Reveals that list `id` as an immediate prerequisite, chronologically.
    pub fn downstream(&self, id: &str) -> Vec<String> {
        let Some(canonical) = self.canonical_id(id) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|e| e.prerequisites.iter().any(|p| p == canonical))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Facts a scene states, in text order.
    pub fn reveals_in_scene(&self, scene_id: &str) -> &[SceneMention] {
        self.by_scene
            .get(scene_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edges removed while breaking cycles.
    pub fn broken_edges(&self) -> &[BrokenEdge] {
        &self.broken_edges
    }

    /// Cycles in the current edge set, as id paths. Empty for any graph this
    /// type builds.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        find_cycles(&self.adjacency())
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|i| self.entries[i].id.clone()).collect())
            .collect()
    }

    /// Canonical ids with every prerequisite before its dependents; ties
    /// are broken by chronological index.
    pub fn topological_sort(&self) -> Vec<String> {
        topological_order(&self.adjacency())
            .into_iter()
            .map(|i| self.entries[i].id.clone())
            .collect()
    }

    /// Entries whose prerequisites are the full transitive closure, in
    /// chronological order.
    pub fn materialize(&self) -> Vec<RevealGraphEntry> {
        let adjacency = self.adjacency();
        let words = self.entries.len().div_ceil(64);
        // One bit row per entry; a row is the union of its prerequisites' rows.
        let mut closure: Vec<Vec<u64>> = vec![vec![0; words]; self.entries.len()];

        for node in topological_order(&adjacency) {
            let mut row = vec![0u64; words];
            for &p in &adjacency[node] {
                row[p / 64] |= 1u64 << (p % 64);
                for (word, bits) in row.iter_mut().zip(&closure[p]) {
                    *word |= bits;
                }
            }
            closure[node] = row;
        }

        self.entries
            .iter()
            .zip(closure)
            .map(|(entry, row)| RevealGraphEntry {
                prerequisites: set_bits(&row)
                    .map(|i| self.entries[i].id.clone())
                    .collect(),
                ..entry.clone()
            })
            .collect()
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        self.entries
            .iter()
            .map(|e| {
                e.prerequisites
                    .iter()
                    .filter_map(|p| self.index.get(p).copied())
                    .collect()
            })
            .collect()
    }
}

/// Indices of the set bits in `row`, ascending.
fn set_bits(row: &[u64]) -> impl Iterator<Item = usize> + '_ {
    row.iter().enumerate().flat_map(|(w, &bits)| {
        (0..64usize).filter(move |&b| bits & (1u64 << b) != 0).map(move |b| w * 64 + b)
    })
}

// ============================================
// Edge inference
// ============================================

fn shares_entity(a: &Reveal, b: &Reveal) -> bool {
    a.entities.iter().any(|e| b.mentions_entity(e))
}

/// Immediate prerequisites of each canonical reveal, as ascending indices.
fn infer_edges(reveals: &[&Reveal], fast_mode: bool) -> Vec<Vec<usize>> {
    reveals
        .iter()
        .enumerate()
        .map(|(i, reveal)| {
            if fast_mode || i == 0 {
                return (0..i).collect();
            }

            // A state change builds on the latest known state of its subject.
            if reveal.pattern == RevealPattern::StateChange {
                let chain = (0..i)
                    .rev()
                    .find(|&j| reveals[j].pattern.is_state() && shares_entity(reveals[j], reveal));
                if let Some(j) = chain {
                    return vec![j];
                }
            }

            // Relationships and back-references need each party introduced.
            if matches!(reveal.pattern, RevealPattern::Relationship | RevealPattern::Temporal) {
                let mut intros: Vec<usize> = reveal
                    .entities
                    .iter()
                    .filter_map(|entity| (0..i).find(|&j| reveals[j].mentions_entity(entity)))
                    .collect();
                intros.sort_unstable();
                intros.dedup();
                if !intros.is_empty() {
                    return intros;
                }
            }

            (0..i).collect()
        })
        .collect()
}

// ============================================
// Cycles and ordering
// ============================================

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Cycles found by an iterative depth-first walk, as index paths where each
/// node depends on the next and the last depends on the first.
fn find_cycles(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut mark = vec![Mark::New; adjacency.len()];
    let mut cycles = Vec::new();

    for root in 0..adjacency.len() {
        if mark[root] != Mark::New {
            continue;
        }
        mark[root] = Mark::Active;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let Some(&child) = adjacency[node].get(top.1) else {
                mark[node] = Mark::Done;
                stack.pop();
                continue;
            };
            top.1 += 1;

            match mark[child] {
                Mark::New => {
                    mark[child] = Mark::Active;
                    stack.push((child, 0));
                }
                Mark::Active => {
                    let from = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                    cycles.push(stack[from..].iter().map(|&(n, _)| n).collect());
                }
                Mark::Done => {}
            }
        }
    }
    cycles
}

/// Remove edges until the graph is acyclic. Returns removed
/// `(dependent, prerequisite)` pairs in removal order.
///
/// From each cycle the edge pointing furthest forward in authored order is
/// removed; ties go to the earliest dependent.
fn break_cycles(adjacency: &mut [Vec<usize>]) -> Vec<(usize, usize)> {
    for (node, prereqs) in adjacency.iter_mut().enumerate() {
        prereqs.retain(|&p| p != node);
    }

    let mut removed = Vec::new();
    loop {
        let cycles = find_cycles(adjacency);
        let Some(cycle) = cycles.first() else {
            break;
        };

        let jump = |&(d, p): &(usize, usize)| p as i64 - d as i64;
        let edge = cycle
            .iter()
            .zip(cycle.iter().cycle().skip(1))
            .map(|(&d, &p)| (d, p))
            .max_by(|a, b| jump(a).cmp(&jump(b)).then(b.0.cmp(&a.0)));

        let Some((d, p)) = edge else {
            break;
        };
        adjacency[d].retain(|&x| x != p);
        removed.push((d, p));
    }
    removed
}

/// Kahn's algorithm over an acyclic adjacency map, lowest index first.
fn topological_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = adjacency.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); adjacency.len()];
    for (node, prereqs) in adjacency.iter().enumerate() {
        for &p in prereqs {
            dependents[p].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..adjacency.len()).filter(|&n| remaining[n] == 0).collect();
    let mut order = Vec::with_capacity(adjacency.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &d in &dependents[node] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.insert(d);
            }
        }
    }
    order
}

// ============================================
// Cache and builder
// ============================================

/// The most recently built graph, keyed by mode and the exact set of reveal
/// ids. A build for a different key replaces it.
#[derive(Debug, Default)]
pub struct GraphCache {
    current: Option<(String, RevealDependencyGraph)>,
    hits: u64,
    misses: u64,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a reveal set.
    pub fn key(reveals: &[Reveal], fast_mode: bool) -> String {
        let mut ids: Vec<&str> = reveals.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let mode = if fast_mode { "fast" } else { "full" };
        format!("{}:{}", mode, ids.join(","))
    }

    fn get(&mut self, key: &str) -> Option<RevealDependencyGraph> {
        match &self.current {
            Some((cached, graph)) if cached == key => {
                self.hits += 1;
                Some(graph.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: String, graph: RevealDependencyGraph) {
        self.current = Some((key, graph));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn len(&self) -> usize {
        usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Builds dependency graphs, caching heuristic builds.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    fast_mode: bool,
    cache: GraphCache,
}

impl GraphBuilder {
    pub fn new(fast_mode: bool) -> Self {
        Self {
            fast_mode,
            cache: GraphCache::new(),
        }
    }

    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Heuristic graph for `reveals`, from cache when the same reveal set
    /// was built before.
    pub fn build(&mut self, reveals: &[Reveal]) -> RevealDependencyGraph {
        let key = GraphCache::key(reveals, self.fast_mode);
        if let Some(graph) = self.cache.get(&key) {
            tracing::debug!(reveals = reveals.len(), "Dependency graph cache hit");
            return graph;
        }

        let graph = RevealDependencyGraph::build(reveals, self.fast_mode);
        tracing::info!(
            reveals = reveals.len(),
            entries = graph.len(),
            fast_mode = self.fast_mode,
            "Built reveal dependency graph"
        );
        self.cache.insert(key, graph.clone());
        graph
    }

    /// Graph with suggested edges applied. Never cached.
    pub fn build_with_suggestions(
        &self,
        reveals: &[Reveal],
        suggestions: &[DependencySuggestion],
    ) -> Result<RevealDependencyGraph> {
        RevealDependencyGraph::build_with_suggestions(reveals, self.fast_mode, suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reveals::RevealExtractor;
    use crate::types::Scene;

    fn reveals_of(scenes: &[(&str, &str)]) -> Vec<Reveal> {
        let scenes: Vec<Scene> = scenes
            .iter()
            .map(|(id, text)| Scene::from_text(id, "c1", text))
            .collect();
        RevealExtractor::new().extract_all(&scenes).unwrap()
    }

    fn suggestion(reveal_id: &str, prerequisites: &[&str]) -> DependencySuggestion {
        DependencySuggestion {
            reveal_id: reveal_id.to_string(),
            prerequisites: prerequisites.iter().map(|s| s.to_string()).collect(),
            first_mention: None,
            proper_introduction: None,
        }
    }

    #[test]
    fn test_state_change_chain() {
        let reveals = reveals_of(&[
            ("s1", "Alice is a doctor."),
            ("s2", "Bob is a sailor."),
            ("s3", "Alice became chief."),
        ]);
        let graph = RevealDependencyGraph::build(&reveals, false);
        assert_eq!(graph.prerequisites(&reveals[2].id), &[reveals[0].id.clone()]);

        let order = graph.topological_sort();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos(&reveals[0].id) < pos(&reveals[2].id));
    }

    #[test]
    fn test_relationship_depends_on_introductions() {
        let reveals = reveals_of(&[
            ("s1", "She met a man named Hale."),
            ("s2", "The storm breaks."),
            ("s3", "Mira is a pilot."),
            ("s4", "Hale loves Mira."),
        ]);
        let graph = RevealDependencyGraph::build(&reveals, false);
        assert_eq!(
            graph.prerequisites(&reveals[3].id),
            &[reveals[0].id.clone(), reveals[2].id.clone()]
        );
    }

    #[test]
    fn test_fallback_and_fast_mode() {
        let reveals = reveals_of(&[
            ("s1", "The virus is engineered."),
            ("s2", "The virus spreads silently."),
            ("s3", "The city falls."),
        ]);
        let graph = RevealDependencyGraph::build(&reveals, false);
        assert!(graph.prerequisites(&reveals[0].id).is_empty());
        assert_eq!(graph.prerequisites(&reveals[2].id).len(), 2);

        let fast = RevealDependencyGraph::build(&reveals, true);
        for (i, entry) in fast.entries().iter().enumerate() {
            assert_eq!(entry.prerequisites.len(), i);
        }
    }

    #[test]
    fn test_aliases_fold_into_first_mention() {
        let reveals = reveals_of(&[
            ("s1", "Sarah is the mole."),
            ("s2", "Sarah is the mole."),
        ]);
        assert_ne!(reveals[0].id, reveals[1].id);

        let graph = RevealDependencyGraph::build(&reveals, false);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.canonical_id(&reveals[1].id), Some(reveals[0].id.as_str()));
        let mentions = graph.reveals_in_scene("s2");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].reveal_id, reveals[0].id);
        assert_eq!(mentions[0].anchor.scene_id, "s2");
        assert_eq!(graph.entry(&reveals[1].id).unwrap().first_exposure_scene_id, "s1");
    }

    #[test]
    fn test_downstream_and_materialize() {
        let reveals = reveals_of(&[
            ("s1", "Alice is a doctor."),
            ("s2", "Alice became chief."),
            ("s3", "Alice became director."),
        ]);
        let graph = RevealDependencyGraph::build(&reveals, false);
        assert_eq!(graph.downstream(&reveals[0].id), vec![reveals[1].id.clone()]);
        assert!(graph.downstream("missing").is_empty());

        let closed = graph.materialize();
        assert_eq!(
            closed[2].prerequisites,
            vec![reveals[0].id.clone(), reveals[1].id.clone()]
        );
    }

    #[test]
    fn test_suggestions_break_cycles() {
        let reveals = reveals_of(&[
            ("s1", "Alice is a doctor."),
            ("s2", "Alice became chief."),
        ]);
        let (a, b) = (reveals[0].id.as_str(), reveals[1].id.as_str());

        let graph =
            RevealDependencyGraph::build_with_suggestions(&reveals, false, &[suggestion(a, &[b, a])])
                .unwrap();
        assert!(graph.detect_cycles().is_empty());
        assert_eq!(
            graph.broken_edges(),
            &[BrokenEdge {
                dependent: a.to_string(),
                prerequisite: b.to_string(),
            }]
        );
        assert_eq!(graph.prerequisites(b), &[a.to_string()]);
        assert!(graph.prerequisites(a).is_empty());
    }

    #[test]
    fn test_unknown_suggestion_rejected() {
        let reveals = reveals_of(&[("s1", "Alice is a doctor.")]);
        let err = RevealDependencyGraph::build_with_suggestions(
            &reveals,
            false,
            &[suggestion(&reveals[0].id, &["rv-nope"])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Enrichment(_)));
    }

    #[test]
    fn test_find_cycles_and_break() {
        // 0 -> 1 -> 2 -> 0
        let mut adjacency = vec![vec![1], vec![2], vec![0]];
        assert_eq!(find_cycles(&adjacency), vec![vec![0, 1, 2]]);
        let removed = break_cycles(&mut adjacency);
        // two forward edges of equal length: the earlier dependent loses its edge
        assert_eq!(removed, vec![(0, 1)]);
        assert!(find_cycles(&adjacency).is_empty());
        assert_eq!(topological_order(&adjacency), vec![0, 2, 1]);
    }

    #[test]
    fn test_builder_caches_by_reveal_set() {
        let reveals = reveals_of(&[("s1", "Alice is a doctor."), ("s2", "Alice became chief.")]);
        let mut builder = GraphBuilder::new(false);
        let first = builder.build(&reveals);
        let second = builder.build(&reveals);
        assert_eq!(first.entries(), second.entries());
        assert_eq!((builder.cache().hits(), builder.cache().misses()), (1, 1));

        let mut fast = GraphBuilder::new(true);
        fast.build(&reveals);
        assert_ne!(
            GraphCache::key(&reveals, true),
            GraphCache::key(&reveals, false)
        );
    }

    #[test]
    fn test_builder_keeps_only_latest_reveal_set() {
        let first = reveals_of(&[("s1", "Alice is a doctor.")]);
        let second = reveals_of(&[("s1", "Bob is a pilot."), ("s2", "Bob became captain.")]);
        let mut builder = GraphBuilder::new(false);

        builder.build(&first);
        builder.build(&second);
        assert_eq!(builder.cache().len(), 1);

        // the first set was replaced, so building it again is a miss
        let rebuilt = builder.build(&first);
        assert_eq!(rebuilt.len(), 1);
        assert_eq!((builder.cache().hits(), builder.cache().misses()), (0, 3));
        assert_eq!(builder.cache().len(), 1);

        builder.build(&first);
        assert_eq!(builder.cache().hits(), 1);

        builder.clear_cache();
        assert!(builder.cache().is_empty());
    }

    #[test]
    fn test_materialize_long_chain() {
        // distinct letter-only names: Kaaa, Kaab, ...
        let name = |i: usize| -> String {
            let letter = |d: usize| char::from(b'a' + (d % 26) as u8);
            format!("K{}{}{}", letter(i / 676), letter(i / 26), letter(i))
        };
        let texts: Vec<(String, String)> = (0..1500)
            .map(|i| (format!("s{i}"), format!("{} became captain.", name(i))))
            .collect();
        let scenes: Vec<Scene> = texts
            .iter()
            .map(|(id, text)| Scene::from_text(id, "c1", text))
            .collect();
        let reveals = RevealExtractor::new().extract_all(&scenes).unwrap();
        assert_eq!(reveals.len(), 1500);

        let started = std::time::Instant::now();
        for fast_mode in [false, true] {
            let graph = RevealDependencyGraph::build(&reveals, fast_mode);
            let closed = graph.materialize();
            assert_eq!(closed.len(), 1500);
            assert_eq!(closed[1499].prerequisites.len(), 1499);
            assert_eq!(closed[1499].prerequisites[0], closed[0].id);
            assert_eq!(closed[1499].prerequisites[1498], closed[1498].id);
            assert!(closed[0].prerequisites.is_empty());
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
