//! Category-specific image enhancement. Fail-open: when the image cannot be
//! decoded or processed the original bytes are returned untouched.

use std::panic;

use image::GrayImage;
use tracing::warn;

use crate::codec;
use crate::error::CodecError;
use crate::models::Category;

pub fn enhance(image: &[u8], category: Category) -> Vec<u8> {
    match panic::catch_unwind(|| try_enhance(image, category)) {
        Ok(Ok(enhanced)) => enhanced,
        Ok(Err(e)) => {
            warn!(
                error = %e,
                category = category.as_str(),
                "enhancement failed, passing image through"
            );
            image.to_vec()
        }
        Err(_) => {
            warn!(category = category.as_str(), "enhancement panicked, passing image through");
            image.to_vec()
        }
    }
}

fn try_enhance(image: &[u8], category: Category) -> Result<Vec<u8>, CodecError> {
    let gray = codec::decode_gray(image)?;
    let enhanced = match category {
        Category::Numeric => numeric(&gray),
        Category::Alphanumeric => alphanumeric(&gray),
        Category::Chinese => chinese(&gray),
        Category::MathExpression | Category::Unknown => default(&gray),
    };
    codec::encode_png(&enhanced)
}

// Otsu binarization, then opening to drop speckles
fn numeric(gray: &GrayImage) -> GrayImage {
    codec::open(&codec::otsu(gray), 1)
}

fn alphanumeric(gray: &GrayImage) -> GrayImage {
    let binary = codec::adaptive_threshold(gray, 5, 2);
    let denoised = codec::denoise(&binary);
    let equalized = codec::equalize(&denoised);
    codec::sharpen(&equalized)
}

// Keep stroke detail: 70% equalized image, 30% edges
fn chinese(gray: &GrayImage) -> GrayImage {
    let blurred = codec::blur(gray, 1.0);
    let equalized = codec::equalize(&blurred);
    let edges = codec::edges(&equalized, 50.0, 150.0);
    codec::blend(&equalized, &edges, 0.7)
}

fn default(gray: &GrayImage) -> GrayImage {
    let blurred = codec::blur(gray, 1.0);
    let binary = codec::adaptive_threshold(&blurred, 5, 2);
    codec::open(&binary, 1)
}
