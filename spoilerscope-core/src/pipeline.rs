//! End-to-end analysis pipeline
//!
//! Runs extraction in bounded chunks, builds the dependency graph and
//! evaluates candidate openings. The pipeline owns the extraction and graph
//! caches, so repeated runs over an unchanged manuscript are cheap.

use crate::config::Config;
use crate::error::Result;
use crate::report::{summarize, CandidateReport};
use crate::reveals::{
    DependencySuggester, ExtractionCache, GraphBuilder, RevealDependencyGraph, RevealExtractor,
};
use crate::spoilers::SpoilerDetector;
use crate::types::{OpeningCandidate, Reveal, Scene, SpoilerAnalysis};
use std::time::Duration;

/// Pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    /// Skip dependency inference
    pub fast_mode: bool,
    /// Scenes extracted per chunk
    pub chunk_size: usize,
    /// Upper bound on a dependency suggester call
    pub enrichment_timeout: Duration,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fast_mode: config.analysis.fast_mode,
            chunk_size: config.analysis.chunk_size.max(1),
            enrichment_timeout: Duration::from_millis(config.enrichment.timeout_ms),
        }
    }
}

/// Extraction, graph building and detection with shared caches.
#[derive(Debug)]
pub struct AnalysisPipeline {
    options: AnalysisOptions,
    extractor: RevealExtractor,
    cache: ExtractionCache,
    builder: GraphBuilder,
    detector: SpoilerDetector,
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new(AnalysisOptions::default())
    }
}

impl AnalysisPipeline {
    pub fn new(options: AnalysisOptions) -> Self {
        Self {
            options,
            extractor: RevealExtractor::new(),
            cache: ExtractionCache::new(),
            builder: GraphBuilder::new(options.fast_mode),
            detector: SpoilerDetector::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(AnalysisOptions::from_config(config))
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn extraction_cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn graph_builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Extract reveals from every scene, in authored order.
    pub fn extract_all(&mut self, scenes: &[Scene]) -> Result<Vec<Reveal>> {
        self.extract_all_with_progress(scenes, |_, _| {})
    }

    /// Extract reveals chunk by chunk, calling `progress(done, total)` after
    /// each chunk.
    pub fn extract_all_with_progress<F>(&mut self, scenes: &[Scene], mut progress: F) -> Result<Vec<Reveal>>
    where
        F: FnMut(usize, usize),
    {
        Scene::validate_all(scenes)?;
        let chunk_size = self.options.chunk_size.max(1);
        let mut reveals = Vec::new();
        for (chunk_index, chunk) in scenes.chunks(chunk_size).enumerate() {
            self.extract_chunk(chunk_index * chunk_size, chunk, &mut reveals)?;
            progress((chunk_index * chunk_size + chunk.len()).min(scenes.len()), scenes.len());
        }

        tracing::debug!(
            scenes = scenes.len(),
            reveals = reveals.len(),
            cache_hits = self.cache.hits(),
            "Extraction complete"
        );
        Ok(reveals)
    }

    fn extract_chunk(&mut self, start: usize, chunk: &[Scene], out: &mut Vec<Reveal>) -> Result<()> {
        for (offset, scene) in chunk.iter().enumerate() {
            let found = self.cache.get_or_extract(&self.extractor, start + offset, scene)?;
            out.extend(found);
        }
        Ok(())
    }

    /// Build the heuristic dependency graph over already extracted reveals.
    pub fn graph(&mut self, reveals: &[Reveal]) -> RevealDependencyGraph {
        self.builder.build(reveals)
    }

    /// Build a graph over already extracted reveals, enriched by `suggester`.
    pub async fn graph_enriched(
        &mut self,
        reveals: &[Reveal],
        suggester: &dyn DependencySuggester,
    ) -> RevealDependencyGraph {
        let timeout = self.options.enrichment_timeout;
        self.builder.build_enriched(reveals, suggester, timeout).await
    }

    /// Extract and build the heuristic dependency graph.
    pub fn build(&mut self, scenes: &[Scene]) -> Result<RevealDependencyGraph> {
        let reveals = self.extract_all(scenes)?;
        Ok(self.graph(&reveals))
    }

    /// Extract and build a graph enriched by `suggester`.
    pub async fn build_enriched(
        &mut self,
        scenes: &[Scene],
        suggester: &dyn DependencySuggester,
    ) -> Result<RevealDependencyGraph> {
        let reveals = self.extract_all_async(scenes).await?;
        Ok(self.graph_enriched(&reveals, suggester).await)
    }

    /// Detect spoilers for one candidate.
    pub fn detect(
        &self,
        candidate: &OpeningCandidate,
        scenes: &[Scene],
        graph: &RevealDependencyGraph,
    ) -> SpoilerAnalysis {
        self.detector.detect_spoilers(candidate, scenes, graph)
    }

    /// Detect and summarize every candidate against one graph.
    pub fn evaluate(
        &self,
        candidates: &[OpeningCandidate],
        scenes: &[Scene],
        graph: &RevealDependencyGraph,
    ) -> Vec<CandidateReport> {
        candidates
            .iter()
            .map(|candidate| {
                let analysis = self.detect(candidate, scenes, graph);
                let summary = summarize(&analysis, scenes, candidate);
                CandidateReport { analysis, summary }
            })
            .collect()
    }

    /// Full run: extract, build, then evaluate every candidate.
    pub fn analyze(
        &mut self,
        scenes: &[Scene],
        candidates: &[OpeningCandidate],
    ) -> Result<Vec<CandidateReport>> {
        let graph = self.build(scenes)?;
        Ok(self.evaluate(candidates, scenes, &graph))
    }

    /// Full run that yields to the runtime between extraction chunks and
    /// optionally consults a dependency suggester.
    pub async fn analyze_async(
        &mut self,
        scenes: &[Scene],
        candidates: &[OpeningCandidate],
        suggester: Option<&dyn DependencySuggester>,
    ) -> Result<Vec<CandidateReport>> {
        let graph = match suggester {
            Some(suggester) => self.build_enriched(scenes, suggester).await?,
            None => {
                let reveals = self.extract_all_async(scenes).await?;
                self.builder.build(&reveals)
            }
        };
        Ok(self.evaluate(candidates, scenes, &graph))
    }

    async fn extract_all_async(&mut self, scenes: &[Scene]) -> Result<Vec<Reveal>> {
        Scene::validate_all(scenes)?;
        let chunk_size = self.options.chunk_size.max(1);
        let mut reveals = Vec::new();
        for (chunk_index, chunk) in scenes.chunks(chunk_size).enumerate() {
            self.extract_chunk(chunk_index * chunk_size, chunk, &mut reveals)?;
            tokio::task::yield_now().await;
        }
        Ok(reveals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reveals::StaticSuggester;

    fn scenes() -> Vec<Scene> {
        vec![
            Scene::from_text("s1", "c1", "The virus is engineered."),
            Scene::from_text("s2", "c1", "The virus spreads silently."),
            Scene::from_text("s3", "c1", "Sarah is the mole."),
        ]
    }

    #[test]
    fn test_chunked_progress() {
        let mut pipeline = AnalysisPipeline::new(AnalysisOptions {
            chunk_size: 2,
            ..AnalysisOptions::default()
        });
        let mut calls = Vec::new();
        let reveals = pipeline
            .extract_all_with_progress(&scenes(), |done, total| calls.push((done, total)))
            .unwrap();
        assert_eq!(reveals.len(), 3);
        assert_eq!(calls, vec![(2, 3), (3, 3)]);
    }

    #[test]
    fn test_second_run_uses_caches() {
        let mut pipeline = AnalysisPipeline::default();
        let scenes = scenes();
        let first = pipeline.build(&scenes).unwrap();
        let second = pipeline.build(&scenes).unwrap();
        assert_eq!(first.entries(), second.entries());
        assert_eq!(pipeline.extraction_cache().hits(), 3);
        assert_eq!(pipeline.graph_builder().cache().hits(), 1);
    }

    #[test]
    fn test_invalid_scene_reports_index() {
        let mut scenes = scenes();
        scenes.push(Scene::from_text(" ", "c1", "Bob is here."));
        let err = AnalysisPipeline::default().build(&scenes).unwrap_err();
        assert!(matches!(err, Error::InvalidScene { index: 3, .. }));
    }

    #[test]
    fn test_analyze_candidates() {
        let candidates = vec![
            OpeningCandidate::new("authored", &["s1"]),
            OpeningCandidate::new("cold-open", &["s2"]),
        ];
        let reports = AnalysisPipeline::default().analyze(&scenes(), &candidates).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].analysis.violations.is_empty());
        assert_eq!(reports[1].summary.spoiler_count, 1);
    }

    #[test]
    fn test_duplicate_scene_id_fails_before_extraction() {
        let scenes = vec![
            Scene::from_text("s1", "c1", "Alice is a doctor."),
            Scene::from_text("s2", "c1", "The storm breaks."),
            Scene::from_text("s1", "c1", "Sarah is the mole."),
        ];
        let mut pipeline = AnalysisPipeline::new(AnalysisOptions {
            chunk_size: 1,
            ..AnalysisOptions::default()
        });
        let mut calls = 0;
        let err = pipeline
            .extract_all_with_progress(&scenes, |_, _| calls += 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScene { index: 2, .. }));
        assert_eq!(calls, 0);
        assert!(pipeline.extraction_cache().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_async_rejects_duplicate_scene_ids() {
        let mut scenes = scenes();
        scenes.push(Scene::from_text("s2", "c1", "Sarah is the traitor."));
        let err = AnalysisPipeline::default()
            .analyze_async(&scenes, &[OpeningCandidate::new("c", &["s3"])], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScene { index: 3, .. }));
    }

    #[tokio::test]
    async fn test_analyze_async_matches_sync() {
        let candidates = vec![OpeningCandidate::new("cold-open", &["s2"])];
        let sync = AnalysisPipeline::default().analyze(&scenes(), &candidates).unwrap();

        let suggester: &dyn DependencySuggester = &StaticSuggester::default();
        let mut pipeline = AnalysisPipeline::default();
        let enriched = pipeline
            .analyze_async(&scenes(), &candidates, Some(suggester))
            .await
            .unwrap();
        let plain = pipeline.analyze_async(&scenes(), &candidates, None).await.unwrap();

        assert_eq!(sync[0].analysis, enriched[0].analysis);
        assert_eq!(sync[0].analysis, plain[0].analysis);
    }
}
