///! Perceptual (average) hashing of element screenshots
use image::imageops::FilterType;

use crate::errors::VisualError;

const HASH_SIDE: u32 = 8;
const HASH_BITS: u32 = HASH_SIDE * HASH_SIDE;

/// 8x8 average hash of an encoded image
pub fn perceptual_hash(encoded: &[u8]) -> Result<u64, VisualError> {
    if encoded.is_empty() {
        return Err(VisualError::InvalidInput("empty screenshot".into()));
    }
    let image = image::load_from_memory(encoded)?;
    let small = image
        .resize_exact(HASH_SIDE, HASH_SIDE, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
    let mean = pixels.iter().map(|&v| v as u32).sum::<u32>() as f64 / pixels.len() as f64;

    let hash = pixels
        .iter()
        .enumerate()
        .filter(|(_, &v)| v as f64 >= mean)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Ok(hash)
}

/// 1 - hamming distance / 64
pub fn hamming_similarity(a: u64, b: u64) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / HASH_BITS as f64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Luma};
    use std::io::Cursor;

    /// PNG with a vertical split: dark left half, light right half (or mirrored)
    pub(crate) fn split_png(mirrored: bool) -> Vec<u8> {
        let img = ImageBuffer::from_fn(32, 32, |x, _| {
            let left = x < 16;
            if left != mirrored {
                Luma([20u8])
            } else {
                Luma([230u8])
            }
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let a = perceptual_hash(&split_png(false)).unwrap();
        let b = perceptual_hash(&split_png(false)).unwrap();
        assert_eq!(a, b);
        assert_eq!(hamming_similarity(a, b), 1.0);
    }

    #[test]
    fn test_mirrored_images_differ() {
        let a = perceptual_hash(&split_png(false)).unwrap();
        let b = perceptual_hash(&split_png(true)).unwrap();
        assert!(hamming_similarity(a, b) < 0.5);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            perceptual_hash(b"not an image"),
            Err(VisualError::ImageProcessing(_))
        ));
        assert!(matches!(
            perceptual_hash(&[]),
            Err(VisualError::InvalidInput(_))
        ));
    }
}
