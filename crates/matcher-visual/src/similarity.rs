///! Weighted fingerprint similarity
use resilience_core_types::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::hash::hamming_similarity;
use crate::models::{SurroundingContext, VisualFingerprint};

pub const HASH_WEIGHT: f64 = 0.4;
pub const BBOX_WEIGHT: f64 = 0.2;
pub const FEATURE_WEIGHT: f64 = 0.3;
pub const CONTEXT_WEIGHT: f64 = 0.1;

/// Weighted contributions that add up to the final score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityBreakdown {
    pub hash: f64,
    pub bbox: f64,
    pub features: f64,
    pub context: f64,
}

impl SimilarityBreakdown {
    pub fn total(&self) -> f64 {
        (self.hash + self.bbox + self.features + self.context).clamp(0.0, 1.0)
    }

    /// Score without the hash term; the hash can add at most `HASH_WEIGHT`
    pub fn geometric(&self) -> f64 {
        self.bbox + self.features + self.context
    }
}

/// Overall similarity between two fingerprints in `[0, 1]`
pub fn similarity(a: &VisualFingerprint, b: &VisualFingerprint) -> SimilarityBreakdown {
    let mut breakdown = geometric_breakdown(
        &a.bounding_box,
        &a.feature_vector,
        &a.surrounding_context,
        &b.bounding_box,
        &b.feature_vector,
        &b.surrounding_context,
    );
    breakdown.hash = HASH_WEIGHT * hamming_similarity(a.perceptual_hash, b.perceptual_hash);
    breakdown
}

/// Every weighted term except the hash
pub(crate) fn geometric_breakdown(
    a_box: &BoundingBox,
    a_features: &[f64],
    a_context: &SurroundingContext,
    b_box: &BoundingBox,
    b_features: &[f64],
    b_context: &SurroundingContext,
) -> SimilarityBreakdown {
    SimilarityBreakdown {
        hash: 0.0,
        bbox: BBOX_WEIGHT * bbox_similarity(a_box, b_box),
        features: FEATURE_WEIGHT * cosine_similarity(a_features, b_features),
        context: CONTEXT_WEIGHT * context_similarity(a_context, b_context),
    }
}

/// Average of IoU and size ratio; disjoint boxes score 0
pub fn bbox_similarity(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let iou = a.iou(b);
    if iou <= 0.0 {
        return 0.0;
    }
    let (small, large) = if a.area() <= b.area() {
        (a.area(), b.area())
    } else {
        (b.area(), a.area())
    };
    let size_ratio = if large <= 0.0 { 0.0 } else { small / large };
    ((iou + size_ratio) / 2.0).clamp(0.0, 1.0)
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Half parent equality, half sibling Jaccard
pub fn context_similarity(a: &SurroundingContext, b: &SurroundingContext) -> f64 {
    let parent = if a.parent == b.parent { 1.0 } else { 0.0 };

    let siblings = if a.siblings.is_empty() && b.siblings.is_empty() {
        1.0
    } else {
        let intersection = a.siblings.iter().filter(|s| b.siblings.contains(s)).count();
        let union = a.siblings.len() + b.siblings.len() - intersection;
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    };

    0.5 * parent + 0.5 * siblings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feature_vector;
    use chrono::Utc;
    use resilience_core_types::Viewport;

    fn fingerprint(bbox: BoundingBox, hash: u64) -> VisualFingerprint {
        let viewport = Viewport::default();
        VisualFingerprint {
            perceptual_hash: hash,
            bounding_box: bbox,
            feature_vector: feature_vector(&bbox, &viewport),
            surrounding_context: SurroundingContext {
                parent: Some("form#login".into()),
                siblings: vec!["input#email".into(), "input#password".into()],
            },
            captured_at: Utc::now(),
            page_url: "https://example.test/login".into(),
            viewport,
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let fp = fingerprint(BoundingBox::new(100.0, 200.0, 120.0, 40.0), 0xF0F0_0F0F_AAAA_5555);
        let score = similarity(&fp, &fp).total();
        assert!((score - 1.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn test_disjoint_boxes_contribute_nothing() {
        let a = fingerprint(BoundingBox::new(0.0, 0.0, 50.0, 50.0), 1);
        let b = fingerprint(BoundingBox::new(600.0, 400.0, 50.0, 50.0), 1);
        let breakdown = similarity(&a, &b);
        assert_eq!(breakdown.bbox, 0.0);
        assert!(breakdown.total() < 1.0);
    }

    #[test]
    fn test_context_both_empty_counts_as_match() {
        let empty = SurroundingContext::default();
        assert_eq!(context_similarity(&empty, &empty), 1.0);

        let other = SurroundingContext {
            parent: Some("div.card".into()),
            siblings: vec!["span".into()],
        };
        assert_eq!(context_similarity(&empty, &other), 0.0);
    }

    #[test]
    fn test_bbox_similarity_rewards_overlap_and_size() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let shifted = BoundingBox::new(10.0, 0.0, 100.0, 100.0);
        let shrunk = BoundingBox::new(0.0, 0.0, 50.0, 50.0);
        assert!(bbox_similarity(&a, &shifted) > bbox_similarity(&a, &shrunk));
    }
}
