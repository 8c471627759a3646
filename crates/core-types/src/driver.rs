//! Browser driver boundary
//!
//! The engine never talks to a browser directly. Everything it needs (DOM queries, element
//! descriptions, screenshots, page state reads, navigation) goes through [`BrowserDriver`].
//! Every call is async and callers are expected to bound it with a timeout.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DriverError;

/// Opaque reference to a live element inside the page
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element geometry in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.area() <= 0.0
    }

    /// Area shared by both boxes (0 when disjoint)
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0.0;
        }
        (right - left) * (bottom - top)
    }

    /// Intersection over union in `[0, 1]`
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            (intersection / union).clamp(0.0, 1.0)
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height <= 0.0 {
            0.0
        } else {
            self.width / self.height
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Structured description of one element, as read from the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub handle: ElementHandle,
    /// Lowercase tag name
    pub tag: String,
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
    pub title: Option<String>,
    pub href: Option<String>,
    #[serde(default)]
    pub text: String,
    pub bounding_box: Option<BoundingBox>,
    pub visible: bool,
    pub enabled: bool,
    /// Short descriptor of the parent element (`form#login`)
    pub parent: Option<String>,
    /// Short descriptors of adjacent siblings
    #[serde(default)]
    pub siblings: Vec<String>,
}

impl Default for ElementHandle {
    fn default() -> Self {
        Self(String::new())
    }
}

impl ElementSnapshot {
    /// Visible and enabled
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }

    /// `tag#id.class1.class2` descriptor used for surrounding-context comparison
    pub fn descriptor(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            out.push('#');
            out.push_str(id);
        }
        for class in self.classes.iter().filter(|c| !c.is_empty()) {
            out.push('.');
            out.push_str(class);
        }
        out
    }

    /// Accessible name in ARIA precedence: label, title, placeholder, text
    pub fn accessible_name(&self) -> Option<&str> {
        self.aria_label
            .as_deref()
            .or(self.title.as_deref())
            .or(self.placeholder.as_deref())
            .or_else(|| {
                let text = self.text.trim();
                (!text.is_empty()).then_some(text)
            })
            .filter(|name| !name.trim().is_empty())
    }
}

/// Coarse connection class as reported by the Network Information API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionClass {
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Wifi,
    Ethernet,
    #[default]
    Unknown,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Slow2g => "slow-2g",
            ConnectionClass::TwoG => "2g",
            ConnectionClass::ThreeG => "3g",
            ConnectionClass::FourG => "4g",
            ConnectionClass::Wifi => "wifi",
            ConnectionClass::Ethernet => "ethernet",
            ConnectionClass::Unknown => "unknown",
        }
    }
}

impl FromStr for ConnectionClass {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" | "slow2g" => ConnectionClass::Slow2g,
            "2g" => ConnectionClass::TwoG,
            "3g" => ConnectionClass::ThreeG,
            "4g" => ConnectionClass::FourG,
            "wifi" => ConnectionClass::Wifi,
            "ethernet" => ConnectionClass::Ethernet,
            "" | "unknown" => ConnectionClass::Unknown,
            other => {
                return Err(DriverError::Protocol(format!(
                    "unrecognised connection class '{other}'"
                )))
            }
        })
    }
}

/// Result of a network measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    /// Round-trip latency in milliseconds
    pub latency_ms: f64,
    pub connection: ConnectionClass,
    pub online: bool,
}

impl Default for NetworkSample {
    fn default() -> Self {
        Self {
            latency_ms: 50.0,
            connection: ConnectionClass::Unknown,
            online: true,
        }
    }
}

/// Structured read of the current DOM state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    /// `loading`, `interactive` or `complete`
    pub ready_state: String,
    pub dom_size: usize,
    pub script_count: usize,
    /// XHR/fetch requests in flight
    pub active_ajax: usize,
    /// Detected framework globals (`react`, `vue`, `angular`, ...)
    #[serde(default)]
    pub framework_markers: Vec<String>,
    /// DOM mutations per second observed over the last sampling window
    pub mutation_rate: f64,
    pub viewport: Viewport,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            ready_state: "complete".to_string(),
            dom_size: 0,
            script_count: 0,
            active_ajax: 0,
            framework_markers: Vec::new(),
            mutation_rate: 0.0,
            viewport: Viewport::default(),
        }
    }
}

impl PageState {
    pub fn has_dynamic_content(&self) -> bool {
        !self.framework_markers.is_empty()
    }
}

/// Browser driver consumed by the engine
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// First element matching a CSS selector
    async fn query_selector(&self, css: &str) -> Result<Option<ElementHandle>, DriverError>;

    /// First element matching an XPath expression
    async fn query_xpath(&self, xpath: &str) -> Result<Option<ElementHandle>, DriverError>;

    /// Snapshots of every currently visible element
    async fn query_all_visible(&self) -> Result<Vec<ElementSnapshot>, DriverError>;

    /// Describe one element, including computed visibility and enabled state
    async fn describe(&self, handle: &ElementHandle) -> Result<ElementSnapshot, DriverError>;

    async fn bounding_box(&self, handle: &ElementHandle)
        -> Result<Option<BoundingBox>, DriverError>;

    /// Encoded image (PNG or JPEG) of a single element
    async fn screenshot_element(&self, handle: &ElementHandle) -> Result<Vec<u8>, DriverError>;

    /// Encoded image of the viewport
    async fn screenshot_page(&self) -> Result<Vec<u8>, DriverError>;

    async fn page_state(&self) -> Result<PageState, DriverError>;

    async fn network_sample(&self) -> Result<NetworkSample, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn reload(&self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
        let b = BoundingBox::new(500.0, 500.0, 100.0, 50.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_descriptor_and_accessible_name() {
        let snapshot = ElementSnapshot {
            handle: ElementHandle::new("e1"),
            tag: "button".into(),
            id: Some("submit".into()),
            classes: vec!["btn".into(), "primary".into()],
            text: "  Send  ".into(),
            visible: true,
            enabled: true,
            ..Default::default()
        };
        assert_eq!(snapshot.descriptor(), "button#submit.btn.primary");
        assert_eq!(snapshot.accessible_name(), Some("Send"));
        assert!(snapshot.is_interactable());
    }

    #[test]
    fn test_connection_class_parse() {
        assert_eq!(
            "slow-2g".parse::<ConnectionClass>().unwrap(),
            ConnectionClass::Slow2g
        );
        assert_eq!("4G".parse::<ConnectionClass>().unwrap(), ConnectionClass::FourG);
        assert!("carrier-pigeon".parse::<ConnectionClass>().is_err());
    }
}
