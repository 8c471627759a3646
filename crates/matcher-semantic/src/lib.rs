///! Semantic Matcher - element meaning and context similarity
///!
///! This crate provides semantic analysis of page elements:
///! - Role classification (tag, ARIA role, class-name and text heuristics)
///! - Interaction type and purpose inference
///! - Keyword extraction from labels and text
///! - Business context detection (checkout, authentication, search, ...)
///! - Weighted semantic similarity and candidate search
///! - Fuzzy text similarity used by the locator's last-resort strategy
pub mod analyzer;
pub mod cache;
pub mod errors;
pub mod keywords;
pub mod matcher;
pub mod models;
pub mod text;

// Re-exports
pub use analyzer::ContextAnalyzer;
pub use cache::ContextCache;
pub use errors::{Result, SemanticError};
pub use keywords::KeywordExtractor;
pub use matcher::{SemanticMatchSettings, SemanticMatcher};
pub use models::*;
pub use text::text_similarity;
