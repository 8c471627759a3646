//! Self-healing element locator
//!
//! This crate resolves elements through an ordered chain of strategies:
//! - CSS selector resolution (primary selector)
//! - Alternative CSS selectors, including selectors learned from earlier heals
//! - XPath expressions
//! - Accessibility matching (role + accessible name)
//! - Visual fingerprint similarity
//! - Semantic context similarity
//! - Fuzzy text matching
//!
//! The static order is perturbed by per-selector outcome history, and only visible, enabled
//! candidates are accepted.

pub mod errors;
pub mod healing;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use healing::*;
pub use resolver::*;
pub use strategies::*;
pub use types::*;
