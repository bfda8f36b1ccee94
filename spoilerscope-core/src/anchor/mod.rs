//! Anchor resolution across manuscript edits
//!
//! A [`SceneSnap`] records where a span lived after an analysis pass. When the
//! manuscript changes, [`AnchorResolver`] relocates the span with four
//! escalating strategies and returns the first success:
//!
//! | Tier | Strategy | Search space | Confidence |
//! |------|----------|--------------|------------|
//! | 1 | Exact text at the stored offset | none | 1.0 |
//! | 2 | Before/after context, churn-normalized | corridor | 0.5 - 0.95 |
//! | 3 | Seed tokens + token overlap | corridor | 0.6 - 0.95 |
//! | 4 | Unique rare shingle | whole text | 0.7 - 0.95 |
//!
//! No match is not an error: [`resolve`] returns `None` and callers flag the
//! anchor for manual review.

mod normalize;
mod snapshot;

pub use normalize::normalize_churn;
pub use snapshot::{checksum, extract_shingles, CONTEXT_CHARS, MAX_SHINGLES, SHINGLE_WORDS};

use crate::config::{Config, DEFAULT_CORRIDOR};
use crate::types::{ResolveResult, ResolveTier, SceneSnap};
use normalize::{ceil_boundary, floor_boundary, head_chars, multiset_overlap, tail_chars, tokens, Normalized};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Context slices shorter than this (normalized bytes) are too ambiguous to match.
const MIN_CONTEXT: usize = 8;

/// Tokens taken from the start of the stored text as the tier 3 seed.
const SEED_TOKENS: usize = 5;

/// Share of seed tokens that must match in place for a tier 3 candidate.
const SEED_MATCH_RATIO: f32 = 0.6;

/// Minimum token overlap for a tier 3 match.
const MIN_OVERLAP: f32 = 0.5;

/// Tunables for [`resolve`].
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Bytes searched on each side of the stale offset by tiers 2 and 3
    pub corridor: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            corridor: DEFAULT_CORRIDOR,
        }
    }
}

type Strategy = fn(&SceneSnap, &str, &ResolveOptions) -> Option<ResolveResult>;

/// Resolution strategies, cheapest first.
const STRATEGIES: [Strategy; 4] = [exact, context_reattach, corridor_fuzzy, rare_shingle];

/// Relocate `snap` in `current`, trying each tier in order.
pub fn resolve(snap: &SceneSnap, current: &str, options: &ResolveOptions) -> Option<ResolveResult> {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(snap, current, options))
}

/// Tier 1: the stored text is still at the stored offset.
fn exact(snap: &SceneSnap, current: &str, _options: &ResolveOptions) -> Option<ResolveResult> {
    let len = snap.span_len()?;
    let slice = current.get(snap.offset..snap.offset.checked_add(len)?)?;

    let unchanged = match &snap.text {
        Some(text) => slice == text,
        // Without the text, a checksum over the same range proves the same bytes.
        None => !snap.checksum.is_empty() && snapshot::checksum(slice) == snap.checksum,
    };

    unchanged.then_some(ResolveResult {
        tier: ResolveTier::Exact,
        confidence: 1.0,
        position: snap.offset,
    })
}

/// Byte range searched around a stale offset, on character boundaries.
fn corridor_bounds(current: &str, offset: usize, span_len: usize, corridor: usize) -> Option<(usize, usize)> {
    let lo = floor_boundary(current, offset.saturating_sub(corridor));
    let hi = ceil_boundary(
        current,
        offset.saturating_add(span_len).saturating_add(corridor),
    );
    (lo < hi).then_some((lo, hi))
}

/// A context slice found in the window: source position and normalized length matched.
struct ContextHit {
    position: usize,
    matched: usize,
}

/// Slices of a context side to try, nearest the span last: full, half, 16 chars.
fn context_slices(context: &str, nearest_end: bool) -> Vec<&str> {
    let total = context.chars().count();
    let mut out = Vec::new();
    for n in [total, total / 2, 16] {
        if n == 0 || n > total {
            continue;
        }
        let slice = if nearest_end {
            tail_chars(context, n)
        } else {
            head_chars(context, n)
        };
        if slice.len() >= MIN_CONTEXT && !out.contains(&slice) {
            out.push(slice);
        }
    }
    out
}

/// Find the longest usable slice of `context` in the window.
///
/// For the before side the hit position is where the match ends; for the
/// after side, where it starts. Among several occurrences the one nearest to
/// `target` wins.
fn find_context(window: &Normalized, context: &str, before: bool, target: usize) -> Option<ContextHit> {
    for slice in context_slices(context, before) {
        let best = window
            .text
            .match_indices(slice)
            .map(|(at, m)| {
                let norm_pos = if before { at + m.len() } else { at };
                (window.original(norm_pos), norm_pos)
            })
            .min_by_key(|(pos, _)| (pos.abs_diff(target), *pos));

        if let Some((position, _)) = best {
            return Some(ContextHit {
                position,
                matched: slice.len(),
            });
        }
    }
    None
}

/// Tier 2: reattach using the surrounding context.
fn context_reattach(snap: &SceneSnap, current: &str, options: &ResolveOptions) -> Option<ResolveResult> {
    let before = snap.before.as_deref().map(normalize_churn).unwrap_or_default();
    let after = snap.after.as_deref().map(normalize_churn).unwrap_or_default();
    if before.len() < MIN_CONTEXT && after.len() < MIN_CONTEXT {
        return None;
    }

    let span_len = snap.span_len().unwrap_or(0);
    let (lo, hi) = corridor_bounds(current, snap.offset, span_len, options.corridor)?;
    let window = Normalized::new(&current[lo..hi], lo, false);

    let before_hit = if before.len() >= MIN_CONTEXT {
        find_context(&window, &before, true, snap.offset)
    } else {
        None
    };
    let after_hit = if after.len() >= MIN_CONTEXT {
        find_context(&window, &after, false, snap.offset.saturating_add(span_len))
    } else {
        None
    };

    let available = [&before, &after]
        .iter()
        .filter(|side| side.len() >= MIN_CONTEXT)
        .map(|side| side.len())
        .sum::<usize>();

    let (position, matched, agree) = match (&before_hit, &after_hit) {
        (Some(b), Some(a)) => {
            let slack = span_len.saturating_mul(2) + CONTEXT_CHARS;
            let agree = a.position >= b.position && a.position - b.position <= slack;
            let matched = if agree { b.matched + a.matched } else { b.matched };
            (b.position, matched, agree)
        }
        (Some(b), None) => (b.position, b.matched, false),
        (None, Some(a)) => {
            let start = span_start_before(&window, snap, a.position)?;
            (start, a.matched, false)
        }
        (None, None) => return None,
    };

    let fraction = matched as f32 / available.max(1) as f32;
    let mut confidence = 0.5 + 0.4 * fraction.min(1.0);
    if agree {
        confidence += 0.05;
    }

    Some(ResolveResult {
        tier: ResolveTier::Context,
        confidence: confidence.clamp(0.5, 0.95),
        position,
    })
}

/// Where the span starts, given only where its trailing context starts.
fn span_start_before(window: &Normalized, snap: &SceneSnap, after_start: usize) -> Option<usize> {
    match &snap.text {
        Some(text) => {
            // Measure the span in normalized units, then map back.
            let norm_len = normalize_churn(text).len();
            let norm_after = (0..=window.text.len()).find(|&i| window.original(i) >= after_start)?;
            let norm_start = norm_after.checked_sub(norm_len)?;
            Some(window.original(norm_start))
        }
        None => after_start.checked_sub(snap.length?),
    }
}

/// Tier 3: token overlap around the stale offset.
fn corridor_fuzzy(snap: &SceneSnap, current: &str, options: &ResolveOptions) -> Option<ResolveResult> {
    let stored = snap.text.as_deref()?;
    let stored_tokens = tokens(stored);
    if stored_tokens.is_empty() {
        return None;
    }

    let seed_len = stored_tokens.len().min(SEED_TOKENS);
    let needed = ((seed_len as f32) * SEED_MATCH_RATIO).ceil() as usize;
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for (_, word) in &stored_tokens {
        *expected.entry(word.as_str()).or_insert(0) += 1;
    }

    let (lo, hi) = corridor_bounds(current, snap.offset, stored.len(), options.corridor)?;
    let window_tokens = tokens(&current[lo..hi]);

    // (overlap, distance, position)
    let mut best: Option<(f32, usize, usize)> = None;
    for k in 0..window_tokens.len() {
        let seed_hits = (0..seed_len)
            .filter(|&i| {
                window_tokens
                    .get(k + i)
                    .is_some_and(|(_, w)| *w == stored_tokens[i].1)
            })
            .count();
        if seed_hits < needed {
            continue;
        }

        let end = (k + stored_tokens.len()).min(window_tokens.len());
        let overlap =
            multiset_overlap(&expected, &window_tokens[k..end]) as f32 / stored_tokens.len() as f32;
        if overlap < MIN_OVERLAP {
            continue;
        }

        let position = lo + window_tokens[k].0;
        let distance = position.abs_diff(snap.offset);
        let better = match best {
            None => true,
            Some((best_overlap, best_distance, _)) => {
                overlap > best_overlap + f32::EPSILON
                    || ((overlap - best_overlap).abs() <= f32::EPSILON && distance < best_distance)
            }
        };
        if better {
            best = Some((overlap, distance, position));
        }
    }

    let (overlap, _, position) = best?;
    Some(ResolveResult {
        tier: ResolveTier::Corridor,
        confidence: (0.6 + 0.35 * overlap).clamp(0.6, 0.95),
        position,
    })
}

/// Tier 4: a rare phrase that occurs exactly once in the whole text.
fn rare_shingle(snap: &SceneSnap, current: &str, _options: &ResolveOptions) -> Option<ResolveResult> {
    let shingles = match &snap.shingles {
        Some(stored) if !stored.is_empty() => stored.clone(),
        _ => extract_shingles(snap.text.as_deref()?, MAX_SHINGLES),
    };
    if shingles.is_empty() {
        return None;
    }

    let haystack = Normalized::new(current, 0, true);
    let span = snap
        .text
        .as_deref()
        .map(|t| Normalized::new(t, 0, true).text);

    // candidate position -> number of unique shingles pointing at it
    let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
    for shingle in &shingles {
        let needle = Normalized::new(shingle, 0, true).text;
        let needle = needle.trim();
        if needle.is_empty() {
            continue;
        }

        let mut hits = haystack.text.match_indices(needle).map(|(at, _)| at);
        let (Some(at), None) = (hits.next(), hits.next()) else {
            continue;
        };

        let within = span.as_deref().and_then(|s| s.find(needle)).unwrap_or(0);
        let start = at.saturating_sub(within);
        *votes.entry(haystack.original(start)).or_insert(0) += 1;
    }

    let (&position, &agreeing) = votes
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))?;

    let confidence = 0.7 + 0.25 * agreeing as f32 / shingles.len() as f32;
    Some(ResolveResult {
        tier: ResolveTier::Shingle,
        confidence: confidence.min(0.95),
        position,
    })
}

// ============================================
// Resolver
// ============================================

/// Outcome for one snapshot in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorOutcome {
    pub id: String,
    pub result: Option<ResolveResult>,
}

/// Results of resolving a batch of snapshots against one text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    /// One outcome per snapshot, in input order
    pub outcomes: Vec<AnchorOutcome>,
    /// Resolved count per tier number
    pub tier_counts: BTreeMap<u8, usize>,
}

impl ResolutionReport {
    /// Snapshots that resolved at any tier.
    pub fn resolved_count(&self) -> usize {
        self.tier_counts.values().sum()
    }

    /// Identifiers left unresolved (for manual review).
    pub fn unresolved_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_none())
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Share of all snapshots resolved at tier 1 or 2.
    pub fn cheap_tier_ratio(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let cheap = self.tier_counts.get(&1).copied().unwrap_or(0)
            + self.tier_counts.get(&2).copied().unwrap_or(0);
        cheap as f32 / self.outcomes.len() as f32
    }
}

/// Relocates stored spans in edited manuscript text.
#[derive(Debug, Clone, Default)]
pub struct AnchorResolver {
    options: ResolveOptions,
}

impl AnchorResolver {
    pub fn new(options: ResolveOptions) -> Self {
        Self { options }
    }

    /// Resolver using the configured corridor.
    pub fn from_config(config: &Config) -> Self {
        Self::new(ResolveOptions {
            corridor: config.resolver.corridor,
        })
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Relocate a single snapshot.
    pub fn resolve(&self, snap: &SceneSnap, current: &str) -> Option<ResolveResult> {
        let result = resolve(snap, current, &self.options);
        match &result {
            Some(r) => tracing::debug!(
                anchor = %snap.id,
                tier = r.tier.number(),
                confidence = r.confidence,
                position = r.position,
                "Anchor resolved"
            ),
            None => tracing::debug!(anchor = %snap.id, offset = snap.offset, "Anchor unresolved"),
        }
        result
    }

    /// Relocate every snapshot and tally tiers.
    pub fn resolve_batch(&self, snaps: &[SceneSnap], current: &str) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        for snap in snaps {
            let result = self.resolve(snap, current);
            if let Some(r) = &result {
                *report.tier_counts.entry(r.tier.number()).or_insert(0) += 1;
            }
            report.outcomes.push(AnchorOutcome {
                id: snap.id.clone(),
                result,
            });
        }

        let unresolved = report.outcomes.len() - report.resolved_count();
        if unresolved > 0 {
            tracing::warn!(
                unresolved,
                total = report.outcomes.len(),
                "Some anchors need manual review"
            );
        }
        report
    }
}
