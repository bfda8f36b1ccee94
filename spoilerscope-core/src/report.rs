//! Candidate-level summaries.
//!
//! Condenses a [`SpoilerAnalysis`] into an [`OpeningAnalysis`]: how many
//! spoilers, how much text the fixes touch, and a verdict.

use crate::types::{
    FixType, OpeningAnalysis, OpeningCandidate, Scene, SpoilerAnalysis, Verdict,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Severity score at which an opening is rejected outright.
const REJECT_SCORE: u32 = 10;

/// Critical violations at which an opening is rejected outright.
const REJECT_CRITICAL: usize = 2;

/// Detection result and summary for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub analysis: SpoilerAnalysis,
    pub summary: OpeningAnalysis,
}

/// Summarize `analysis`, stamped with the current time.
pub fn summarize(
    analysis: &SpoilerAnalysis,
    scenes: &[Scene],
    candidate: &OpeningCandidate,
) -> OpeningAnalysis {
    summarize_at(analysis, scenes, candidate, Utc::now())
}

/// Summarize `analysis` with an explicit timestamp.
pub fn summarize_at(
    analysis: &SpoilerAnalysis,
    scenes: &[Scene],
    candidate: &OpeningCandidate,
    analyzed_at: DateTime<Utc>,
) -> OpeningAnalysis {
    let score = analysis.total_severity_score;
    let spoiler_count = analysis.violations.len();
    let edit_burden_percent = edit_burden(analysis, scenes, candidate);

    let verdict = if spoiler_count == 0 {
        Verdict::Accept
    } else if analysis.severity_counts.critical >= REJECT_CRITICAL || score >= REJECT_SCORE {
        Verdict::Reject
    } else {
        Verdict::Revise
    };

    let rationale = match verdict {
        Verdict::Accept => "No premature reveals in this reading order".to_string(),
        Verdict::Revise => format!(
            "{} premature reveal(s), fixable by editing {:.1}% of the opening",
            spoiler_count, edit_burden_percent
        ),
        Verdict::Reject => format!(
            "{} premature reveal(s), {} critical, severity score {}",
            spoiler_count, analysis.severity_counts.critical, score
        ),
    };

    OpeningAnalysis {
        candidate_id: candidate.id.clone(),
        spoiler_count,
        edit_burden_percent,
        confidence: 10.0 / (10.0 + score as f32),
        verdict,
        rationale,
        analyzed_at,
    }
}

/// Words touched by fixes as a percentage of the candidate's words.
fn edit_burden(analysis: &SpoilerAnalysis, scenes: &[Scene], candidate: &OpeningCandidate) -> f32 {
    let wanted: HashSet<&str> = candidate.scene_ids.iter().map(String::as_str).collect();
    let mut counted: HashSet<&str> = HashSet::new();
    let total: usize = scenes
        .iter()
        .filter(|s| wanted.contains(s.id.as_str()) && counted.insert(s.id.as_str()))
        .map(|s| {
            if s.word_count > 0 {
                s.word_count
            } else {
                s.text.split_whitespace().count()
            }
        })
        .sum();
    if total == 0 {
        return 0.0;
    }

    let touched: usize = analysis
        .violations
        .iter()
        .map(|v| match v.fix.fix_type {
            FixType::Replace | FixType::Delete => v.fix.original.split_whitespace().count().max(1),
            FixType::Insert => v.fix.suggested.split_whitespace().count(),
        })
        .sum();

    (touched as f32 / total as f32 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        IntroductionSite, MentionSite, Severity, SeverityCounts, SpoilerViolation, SuggestedFix,
        TextAnchor,
    };

    fn violation(severity: Severity, fix_type: FixType, original: &str) -> SpoilerViolation {
        let anchor = TextAnchor {
            scene_id: "s2".to_string(),
            offset: 0,
            length: original.len(),
        };
        SpoilerViolation {
            reveal_id: "rv-1".to_string(),
            reveal_description: "x".to_string(),
            mentioned_in: MentionSite {
                scene_id: "s2".to_string(),
                anchor: anchor.clone(),
                quote: String::new(),
            },
            should_reveal_at: IntroductionSite {
                scene_id: "s1".to_string(),
                chronological_index: 0,
            },
            severity,
            spoiled_dependents: Vec::new(),
            fix: SuggestedFix {
                fix_type,
                anchor,
                original: original.to_string(),
                suggested: String::new(),
                reason: String::new(),
            },
            missing_prerequisites: Vec::new(),
        }
    }

    fn analysis(violations: Vec<SpoilerViolation>) -> SpoilerAnalysis {
        let mut counts = SeverityCounts::default();
        let mut score = 0;
        for v in &violations {
            counts.record(v.severity);
            score += v.severity.weight();
        }
        SpoilerAnalysis {
            candidate_id: "c".to_string(),
            violations,
            safe_reveals: Vec::new(),
            severity_counts: counts,
            total_severity_score: score,
        }
    }

    fn scenes() -> Vec<Scene> {
        vec![
            Scene::from_text("s1", "c1", "one two three four five"),
            Scene::from_text("s2", "c1", "six seven eight nine ten"),
        ]
    }

    #[test]
    fn test_clean_opening_is_accepted() {
        let candidate = OpeningCandidate::new("c", &["s2"]);
        let summary = summarize(&analysis(Vec::new()), &scenes(), &candidate);
        assert_eq!(summary.verdict, Verdict::Accept);
        assert_eq!(summary.confidence, 1.0);
        assert_eq!(summary.edit_burden_percent, 0.0);
    }

    #[test]
    fn test_minor_spoiler_is_revise() {
        let candidate = OpeningCandidate::new("c", &["s2"]);
        let summary = summarize(
            &analysis(vec![violation(Severity::Minor, FixType::Delete, "seven")]),
            &scenes(),
            &candidate,
        );
        assert_eq!(summary.verdict, Verdict::Revise);
        assert_eq!(summary.spoiler_count, 1);
        assert!((summary.edit_burden_percent - 20.0).abs() < 1e-4);
        assert!((summary.confidence - 10.0 / 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_critical_is_reject() {
        let candidate = OpeningCandidate::new("c", &["s2", "s1"]);
        let summary = summarize(
            &analysis(vec![
                violation(Severity::Critical, FixType::Replace, "six"),
                violation(Severity::Critical, FixType::Replace, "ten"),
            ]),
            &scenes(),
            &candidate,
        );
        assert_eq!(summary.verdict, Verdict::Reject);
        assert!((summary.edit_burden_percent - 20.0).abs() < 1e-4);
        assert!(summary.rationale.contains("2 critical"));
    }
}
