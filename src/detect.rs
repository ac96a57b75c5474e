//! Heuristic input-type classifier. Pure and total: any failure, including a
//! panic inside the image stack, yields [`Category::Unknown`].

use std::panic;

use tracing::debug;

use crate::codec::{self, Blob};
use crate::error::CodecError;
use crate::models::Category;

const BINARY_LEVEL: u8 = 150;
const MATH_ASPECT_RATIO: f64 = 3.0;
const CHINESE_MIN_COMPLEXITY: f64 = 20.0;
const CHINESE_MIN_AREA_SHARE: f64 = 0.02;
const NUMERIC_MAX_HEIGHT_VARIANCE: f64 = 0.1;

pub fn detect(image: &[u8]) -> Category {
    match panic::catch_unwind(|| try_detect(image)) {
        Ok(Ok(category)) => category,
        Ok(Err(e)) => {
            debug!(error = %e, "type detection failed, treating input as unknown");
            Category::Unknown
        }
        Err(_) => {
            debug!("type detection panicked, treating input as unknown");
            Category::Unknown
        }
    }
}

fn try_detect(image: &[u8]) -> Result<Category, CodecError> {
    let gray = codec::decode_gray(image)?;
    let (width, height) = gray.dimensions();

    if width as f64 / height as f64 > MATH_ASPECT_RATIO {
        return Ok(Category::MathExpression);
    }

    let binary = codec::threshold(&gray, BINARY_LEVEL, true);
    let blobs = codec::external_contours(&binary);
    Ok(classify_blobs(&blobs, width, height))
}

// First match wins: Chinese, then Numeric, else Alphanumeric
fn classify_blobs(blobs: &[Blob], width: u32, height: u32) -> Category {
    if blobs.is_empty() {
        return Category::Alphanumeric;
    }

    let count = blobs.len() as f64;
    let avg_complexity = blobs.iter().map(|b| b.points as f64).sum::<f64>() / count;
    let avg_area = blobs.iter().map(|b| b.area).sum::<f64>() / count;
    let image_area = width as f64 * height as f64;

    if avg_complexity > CHINESE_MIN_COMPLEXITY && avg_area > CHINESE_MIN_AREA_SHARE * image_area {
        return Category::Chinese;
    }

    if (3..=6).contains(&blobs.len()) {
        let mean = blobs.iter().map(|b| b.height as f64).sum::<f64>() / count;
        let variance = blobs
            .iter()
            .map(|b| (b.height as f64 - mean).powi(2))
            .sum::<f64>()
            / count;
        if variance < NUMERIC_MAX_HEIGHT_VARIANCE * mean {
            return Category::Numeric;
        }
    }

    Category::Alphanumeric
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_images::rects_png;

    #[test]
    fn undecodable_input_is_unknown() {
        assert_eq!(detect(b"\x89PNG but not really"), Category::Unknown);
        assert_eq!(detect(&[]), Category::Unknown);
    }

    #[test]
    fn wide_images_are_math_expressions() {
        assert_eq!(detect(&rects_png(200, 40, &[])), Category::MathExpression);
    }

    #[test]
    fn evenly_sized_glyphs_are_numeric() {
        let glyphs = [(10, 14, 3, 12), (40, 14, 3, 12), (70, 14, 3, 12), (100, 14, 3, 12)];
        let png = rects_png(120, 40, &glyphs);
        assert_eq!(detect(&png), Category::Numeric);
    }

    #[test]
    fn large_complex_glyphs_are_chinese() {
        let png = rects_png(120, 40, &[(10, 5, 30, 30), (70, 5, 30, 30)]);
        assert_eq!(detect(&png), Category::Chinese);
    }

    #[test]
    fn uneven_glyphs_are_alphanumeric() {
        let glyphs = [(10, 20, 3, 8), (40, 16, 3, 12), (70, 10, 3, 20), (100, 6, 3, 28)];
        let png = rects_png(120, 40, &glyphs);
        assert_eq!(detect(&png), Category::Alphanumeric);
    }

    #[test]
    fn too_few_glyphs_are_alphanumeric() {
        let png = rects_png(120, 40, &[(10, 14, 3, 12), (40, 14, 3, 12)]);
        assert_eq!(detect(&png), Category::Alphanumeric);
    }

    #[test]
    fn blank_image_is_alphanumeric() {
        assert_eq!(detect(&rects_png(60, 30, &[])), Category::Alphanumeric);
    }
}
