//! Reveals and their dependency structure
//!
//! - [`RevealExtractor`] finds narrative facts in scene text
//! - [`RevealDependencyGraph`] orders them by what each one needs the reader
//!   to already know
//! - [`DependencySuggester`] lets an external source override inferred edges

mod enrich;
mod extractor;
mod graph;

pub use enrich::{DependencySuggester, DependencySuggestion, StaticSuggester};
pub use extractor::{reveal_id, ExtractionCache, RevealExtractor};
pub use graph::{BrokenEdge, GraphBuilder, GraphCache, RevealDependencyGraph, SceneMention};
