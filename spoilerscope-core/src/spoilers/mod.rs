//! Spoiler detection for alternate openings
//!
//! [`SpoilerDetector`] simulates a reader meeting the scenes of a candidate
//! opening first. Each reveal read before its prerequisites becomes a
//! [`SpoilerViolation`](crate::types::SpoilerViolation) with a severity and a
//! suggested fix anchored in the scene text.

mod detector;
mod fix;
mod severity;

pub use detector::SpoilerDetector;
pub use fix::generate_fix;
pub use severity::classify;
pub(crate) use severity::{contains_word, IDENTITY_KEYWORDS};
