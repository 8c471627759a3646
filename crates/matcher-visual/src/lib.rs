//! Visual Matcher - fingerprinting and similarity scoring for element relocation
//!
//! This crate provides:
//! - Perceptual hashing of element screenshots
//! - Visual fingerprints (hash, geometry, feature vector, surrounding context)
//! - Weighted fingerprint similarity
//! - A bounded fingerprint cache keyed by (selector, page URL)
//! - Candidate search over the currently visible elements

pub mod cache;
pub mod errors;
pub mod hash;
pub mod matcher;
pub mod models;
pub mod similarity;

// Re-exports
pub use cache::FingerprintCache;
pub use errors::VisualError;
pub use hash::{hamming_similarity, perceptual_hash};
pub use matcher::{VisualMatchSettings, VisualMatcher};
pub use models::*;
pub use similarity::{similarity, SimilarityBreakdown};
