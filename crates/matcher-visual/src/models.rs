///! Data models for visual matching
use chrono::{DateTime, Utc};
use resilience_core_types::{BoundingBox, ElementSnapshot, Viewport};
use serde::{Deserialize, Serialize};

use crate::similarity::SimilarityBreakdown;

/// Parent and sibling descriptors around an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurroundingContext {
    pub parent: Option<String>,
    pub siblings: Vec<String>,
}

impl SurroundingContext {
    pub fn from_snapshot(snapshot: &ElementSnapshot) -> Self {
        Self {
            parent: snapshot.parent.clone(),
            siblings: snapshot.siblings.clone(),
        }
    }
}

/// Visual fingerprint of an element at capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualFingerprint {
    /// 64-bit average hash of the element screenshot
    pub perceptual_hash: u64,
    pub bounding_box: BoundingBox,
    /// aspect, relative area, relative center x/y, relative width/height
    pub feature_vector: Vec<f64>,
    pub surrounding_context: SurroundingContext,
    pub captured_at: DateTime<Utc>,
    pub page_url: String,
    pub viewport: Viewport,
}

/// Element scored against a target fingerprint
#[derive(Debug, Clone)]
pub struct VisualCandidate {
    pub element: ElementSnapshot,
    pub score: f64,
    pub breakdown: SimilarityBreakdown,
}

/// Geometry-only feature vector relative to the viewport
pub fn feature_vector(bbox: &BoundingBox, viewport: &Viewport) -> Vec<f64> {
    let vw = viewport.width.max(1.0);
    let vh = viewport.height.max(1.0);
    let aspect = bbox.aspect_ratio();
    vec![
        aspect / (1.0 + aspect),
        (bbox.area() / (vw * vh)).min(1.0),
        (bbox.x + bbox.width / 2.0) / vw,
        (bbox.y + bbox.height / 2.0) / vh,
        bbox.width / vw,
        bbox.height / vh,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_is_relative() {
        let viewport = Viewport {
            width: 1000.0,
            height: 500.0,
        };
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let features = feature_vector(&bbox, &viewport);
        assert_eq!(features.len(), 6);
        assert!((features[0] - 0.5).abs() < 1e-9);
        assert!((features[1] - 0.02).abs() < 1e-9);
        assert!((features[2] - 0.05).abs() < 1e-9);
        assert!((features[5] - 0.2).abs() < 1e-9);
    }
}
