//! Core types for locator system

use std::time::Duration;

use chrono::{DateTime, Utc};
use matcher_semantic::SemanticContext;
use matcher_visual::VisualFingerprint;
use resilience_core_types::{ElementHandle, ElementSnapshot};
use serde::{Deserialize, Serialize};

/// Locator strategy enumeration, in static priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorStrategy {
    /// Primary CSS selector
    Css,

    /// Alternative CSS selectors, plus selectors learned from earlier heals
    AlternativeSelector,

    /// XPath expressions
    Xpath,

    /// ARIA role and accessible name
    Accessibility,

    /// Visual fingerprint similarity
    Visual,

    /// Semantic context similarity
    Semantic,

    /// Fuzzy text matching
    Fuzzy,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Css => "css",
            LocatorStrategy::AlternativeSelector => "alternative-selector",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::Accessibility => "accessibility",
            LocatorStrategy::Visual => "visual",
            LocatorStrategy::Semantic => "semantic",
            LocatorStrategy::Fuzzy => "fuzzy",
        }
    }

    /// Static priority (lower runs first)
    pub fn priority(&self) -> u32 {
        match self {
            LocatorStrategy::Css => 1,
            LocatorStrategy::AlternativeSelector => 2,
            LocatorStrategy::Xpath => 3,
            LocatorStrategy::Accessibility => 4,
            LocatorStrategy::Visual => 5,
            LocatorStrategy::Semantic => 6,
            LocatorStrategy::Fuzzy => 7,
        }
    }

    /// Get all strategies in fallback order
    pub fn fallback_chain() -> Vec<LocatorStrategy> {
        vec![
            LocatorStrategy::Css,
            LocatorStrategy::AlternativeSelector,
            LocatorStrategy::Xpath,
            LocatorStrategy::Accessibility,
            LocatorStrategy::Visual,
            LocatorStrategy::Semantic,
            LocatorStrategy::Fuzzy,
        ]
    }
}

/// Accessibility hints for an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityHints {
    pub role: Option<String>,
    /// Accessible name (aria-label, title, placeholder or text)
    pub name: Option<String>,
}

/// Everything known about how to find one element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorDescriptor {
    /// Primary CSS selector; also the key outcome history is tracked under
    pub primary: String,
    #[serde(default)]
    pub css: Vec<String>,
    #[serde(default)]
    pub xpath: Vec<String>,
    pub accessibility: Option<AccessibilityHints>,
    pub visual_fingerprint: Option<VisualFingerprint>,
    pub semantic_context: Option<SemanticContext>,
    /// Visible text the element is expected to carry
    pub text: Option<String>,
}

impl SelectorDescriptor {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            ..Default::default()
        }
    }

    pub fn with_alternatives<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.css.extend(selectors.into_iter().map(Into::into));
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath.push(xpath.into());
        self
    }

    pub fn with_accessibility(mut self, role: Option<&str>, name: Option<&str>) -> Self {
        self.accessibility = Some(AccessibilityHints {
            role: role.map(str::to_string),
            name: name.map(str::to_string),
        });
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_visual(mut self, fingerprint: VisualFingerprint) -> Self {
        self.visual_fingerprint = Some(fingerprint);
        self
    }

    pub fn with_semantic(mut self, context: SemanticContext) -> Self {
        self.semantic_context = Some(context);
        self
    }

    /// Text used by fuzzy matching: explicit text, else the accessible name hint
    pub fn expected_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.accessibility.as_ref().and_then(|a| a.name.as_deref()))
            .filter(|t| !t.trim().is_empty())
    }
}

/// Element candidate produced by a strategy
#[derive(Debug, Clone)]
pub struct Candidate {
    pub handle: ElementHandle,
    /// Selector that produced the candidate, for selector-based strategies
    pub matched_selector: Option<String>,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

impl Candidate {
    pub fn new(handle: ElementHandle, confidence: f64) -> Self {
        Self {
            handle,
            matched_selector: None,
            confidence,
        }
    }

    pub fn via_selector(handle: ElementHandle, selector: &str, confidence: f64) -> Self {
        Self {
            handle,
            matched_selector: Some(selector.to_string()),
            confidence,
        }
    }
}

/// One entry of the lookup trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: LocatorStrategy,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

/// Successful lookup
#[derive(Debug, Clone)]
pub struct LocatedElement {
    pub handle: ElementHandle,
    pub snapshot: ElementSnapshot,
    pub strategy: LocatorStrategy,
    pub matched_selector: Option<String>,
    pub confidence: f64,
    pub duration: Duration,
    pub attempts: Vec<StrategyAttempt>,
}

/// Stable characteristics of a healed element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCharacteristics {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub text: String,
}

impl From<&ElementSnapshot> for ElementCharacteristics {
    fn from(snapshot: &ElementSnapshot) -> Self {
        Self {
            tag: snapshot.tag.clone(),
            id: snapshot.id.clone(),
            classes: snapshot.classes.clone(),
            role: snapshot.role.clone(),
            text: snapshot.text.trim().to_string(),
        }
    }
}

/// Successful non-primary resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealRecord {
    pub selector: String,
    pub strategy: LocatorStrategy,
    pub matched_selector: Option<String>,
    pub element: ElementCharacteristics,
    pub at: DateTime<Utc>,
}
