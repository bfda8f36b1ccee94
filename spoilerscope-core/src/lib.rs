//! # spoilerscope-core
//!
//! Core library for spoilerscope - a reading-order analyzer for manuscripts
//! split into scenes.
//!
//! This library provides:
//! - Domain types for scenes, reveals, candidates and violations
//! - Reveal extraction and the reveal dependency graph
//! - Spoiler detection for alternate openings
//! - Anchor resolution across manuscript edits
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows one way:
//!
//! ```text
//! scenes ─► RevealExtractor ─► reveals ─► RevealDependencyGraph ─┐
//!                                                                 ├─► SpoilerDetector ─► SpoilerAnalysis
//!                                              OpeningCandidate ─┘
//! ```
//!
//! The [`anchor`] module is independent: it relocates stored spans whenever the
//! manuscript text changes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use spoilerscope_core::{AnalysisPipeline, Config, Manuscript};
//!
//! let config = Config::load().expect("failed to load config");
//! let manuscript = Manuscript::load("manuscript.json").expect("failed to load manuscript");
//!
//! let mut pipeline = AnalysisPipeline::from_config(&config);
//! let graph = pipeline.build(&manuscript.scenes).expect("invalid scenes");
//! for candidate in &manuscript.candidates {
//!     let analysis = pipeline.detect(candidate, &manuscript.scenes, &graph);
//!     println!("{}: {} violation(s)", candidate.id, analysis.violations.len());
//! }
//! ```

// Re-export commonly used items at the crate root
pub use anchor::{AnchorResolver, ResolutionReport, ResolveOptions};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{AnalysisOptions, AnalysisPipeline};
pub use report::{summarize, CandidateReport};
pub use reveals::{
    DependencySuggester, DependencySuggestion, ExtractionCache, GraphBuilder, GraphCache,
    RevealDependencyGraph, RevealExtractor, StaticSuggester,
};
pub use spoilers::SpoilerDetector;
pub use types::*;

// Public modules
pub mod anchor;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod reveals;
pub mod spoilers;
pub mod types;
