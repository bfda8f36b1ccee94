//! Optional dependency enrichment.
//!
//! An external collaborator (typically a language model) may propose
//! prerequisites for reveals. Its output is only ever an override: on error,
//! timeout or malformed suggestions the heuristic graph is used unchanged.

use super::graph::{GraphBuilder, RevealDependencyGraph};
use crate::error::Result;
use crate::types::Reveal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Proposed prerequisites for one reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySuggestion {
    pub reveal_id: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Scene where the fact is first mentioned, if the suggester knows
    #[serde(default)]
    pub first_mention: Option<String>,
    /// Scene where the fact should be introduced; applied when the fact
    /// actually appears in that scene
    #[serde(default)]
    pub proper_introduction: Option<String>,
}

/// Source of dependency suggestions.
#[async_trait]
pub trait DependencySuggester: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn suggest(&self, reveals: &[Reveal]) -> Result<Vec<DependencySuggestion>>;
}

/// Suggestions fixed up front, e.g. read from a file produced offline.
#[derive(Debug, Clone, Default)]
pub struct StaticSuggester {
    suggestions: Vec<DependencySuggestion>,
}

impl StaticSuggester {
    pub fn new(suggestions: Vec<DependencySuggestion>) -> Self {
        Self { suggestions }
    }

    /// Load a JSON array of suggestions.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let suggestions: Vec<DependencySuggestion> = serde_json::from_str(&content)?;
        Ok(Self::new(suggestions))
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

#[async_trait]
impl DependencySuggester for StaticSuggester {
    fn name(&self) -> &str {
        "static"
    }

    async fn suggest(&self, _reveals: &[Reveal]) -> Result<Vec<DependencySuggestion>> {
        Ok(self.suggestions.clone())
    }
}

impl GraphBuilder {
    /// Build with suggestions from `suggester`, falling back to the
    /// heuristic graph if it fails, times out or names unknown reveals.
    pub async fn build_enriched(
        &mut self,
        reveals: &[Reveal],
        suggester: &dyn DependencySuggester,
        timeout: Duration,
    ) -> RevealDependencyGraph {
        let suggestions = match tokio::time::timeout(timeout, suggester.suggest(reveals)).await {
            Ok(Ok(suggestions)) => suggestions,
            Ok(Err(e)) => {
                tracing::warn!(suggester = suggester.name(), error = %e, "Enrichment failed, using heuristic graph");
                return self.build(reveals);
            }
            Err(_) => {
                tracing::warn!(
                    suggester = suggester.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Enrichment timed out, using heuristic graph"
                );
                return self.build(reveals);
            }
        };

        match self.build_with_suggestions(reveals, &suggestions) {
            Ok(graph) => {
                tracing::info!(
                    suggester = suggester.name(),
                    suggestions = suggestions.len(),
                    "Applied dependency suggestions"
                );
                graph
            }
            Err(e) => {
                tracing::warn!(suggester = suggester.name(), error = %e, "Rejected dependency suggestions");
                self.build(reveals)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reveals::RevealExtractor;
    use crate::types::Scene;

    struct Failing;

    #[async_trait]
    impl DependencySuggester for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn suggest(&self, _reveals: &[Reveal]) -> Result<Vec<DependencySuggestion>> {
            Err(Error::Enrichment("service unavailable".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl DependencySuggester for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn suggest(&self, _reveals: &[Reveal]) -> Result<Vec<DependencySuggestion>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn reveals() -> Vec<Reveal> {
        let scenes = vec![
            Scene::from_text("s1", "c1", "The virus is engineered."),
            Scene::from_text("s2", "c1", "The virus spreads silently."),
            Scene::from_text("s3", "c1", "The city falls."),
        ];
        RevealExtractor::new().extract_all(&scenes).unwrap()
    }

    #[tokio::test]
    async fn test_static_suggestions_replace_edges() {
        let reveals = reveals();
        let suggester = StaticSuggester::new(vec![DependencySuggestion {
            reveal_id: reveals[2].id.clone(),
            prerequisites: vec![reveals[1].id.clone()],
            first_mention: None,
            proper_introduction: None,
        }]);

        let mut builder = GraphBuilder::new(false);
        let graph = builder
            .build_enriched(&reveals, &suggester, Duration::from_secs(1))
            .await;
        assert_eq!(graph.prerequisites(&reveals[2].id), &[reveals[1].id.clone()]);
        // untouched reveals keep heuristic edges
        assert_eq!(graph.prerequisites(&reveals[1].id), &[reveals[0].id.clone()]);
        assert!(builder.cache().is_empty());
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let reveals = reveals();
        let mut builder = GraphBuilder::new(false);
        let heuristic = RevealDependencyGraph::build(&reveals, false);

        let graph = builder
            .build_enriched(&reveals, &Failing, Duration::from_secs(1))
            .await;
        assert_eq!(graph.entries(), heuristic.entries());
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let reveals = reveals();
        let mut builder = GraphBuilder::new(false);
        let graph = builder
            .build_enriched(&reveals, &Slow, Duration::from_millis(20))
            .await;
        assert_eq!(graph.prerequisites(&reveals[2].id).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ids_fall_back() {
        let reveals = reveals();
        let suggester = StaticSuggester::new(vec![DependencySuggestion {
            reveal_id: "rv-0000000000000000".to_string(),
            prerequisites: Vec::new(),
            first_mention: None,
            proper_introduction: None,
        }]);
        let mut builder = GraphBuilder::new(false);
        let graph = builder
            .build_enriched(&reveals, &suggester, Duration::from_secs(1))
            .await;
        assert_eq!(graph.prerequisites(&reveals[2].id).len(), 2);
    }

    #[test]
    fn test_suggestions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(
            &path,
            r#"[{"reveal_id":"rv-a","prerequisites":["rv-b"]},{"reveal_id":"rv-c"}]"#,
        )
        .unwrap();
        let suggester = StaticSuggester::from_file(&path).unwrap();
        assert_eq!(suggester.len(), 2);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(StaticSuggester::from_file(&path), Err(Error::Json(_))));
    }
}
