//! Pixel primitives used by type detection, preprocessing and segmentation.
//! Thin wrappers over `image` and `imageproc`; everything works on 8-bit
//! grayscale.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;

use crate::error::CodecError;

/// External contour of a connected foreground region.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Number of border points, a rough shape-complexity measure.
    pub points: usize,
    /// Polygon area enclosed by the border points.
    pub area: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, CodecError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(CodecError::Empty(width, height));
    }
    Ok(gray)
}

pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

// Fixed-level binarization. With `invert`, dark pixels become foreground (255).
pub fn threshold(image: &GrayImage, level: u8, invert: bool) -> GrayImage {
    map_gray(image, |p| if (p > level) != invert { 255 } else { 0 })
}

pub fn otsu(image: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(image);
    threshold(image, level, false)
}

/// Mean-of-neighbourhood binarization: a pixel is white when it is brighter
/// than the local mean minus `offset`.
pub fn adaptive_threshold(image: &GrayImage, block_radius: u32, offset: i16) -> GrayImage {
    let mean = imageproc::filter::box_filter(image, block_radius, block_radius);
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let local = mean.get_pixel(x, y)[0] as i16;
        let value = if pixel[0] as i16 > local - offset { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

// Morphological opening with a (2k+1) square structuring element
pub fn open(image: &GrayImage, k: u8) -> GrayImage {
    imageproc::morphology::open(image, Norm::LInf, k)
}

// 3x3 median, imageproc has no non-local-means filter
pub fn denoise(image: &GrayImage) -> GrayImage {
    imageproc::filter::median_filter(image, 1, 1)
}

// Global histogram equalization in place of CLAHE
pub fn equalize(image: &GrayImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(image)
}

pub fn blur(image: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

pub fn edges(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    imageproc::edges::canny(image, low, high)
}

// 3x3 kernel [0 -1 0; -1 5 -1; 0 -1 0]
pub fn sharpen(image: &GrayImage) -> GrayImage {
    imageproc::filter::sharpen3x3(image)
}

/// Per-pixel `weight * a + (1 - weight) * b`. Both images must share dimensions.
pub fn blend(a: &GrayImage, b: &GrayImage, weight: f32) -> GrayImage {
    let mut out = a.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let mixed =
            weight * a.get_pixel(x, y)[0] as f32 + (1.0 - weight) * b.get_pixel(x, y)[0] as f32;
        pixel[0] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Outer borders of top-level foreground regions (non-zero pixels).
pub fn external_contours(binary: &GrayImage) -> Vec<Blob> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| {
            c.parent.is_none() && c.border_type == BorderType::Outer && !c.points.is_empty()
        })
        .map(|c| {
            let min_x = c.points.iter().map(|p| p.x).min().unwrap_or(0);
            let max_x = c.points.iter().map(|p| p.x).max().unwrap_or(0);
            let min_y = c.points.iter().map(|p| p.y).min().unwrap_or(0);
            let max_y = c.points.iter().map(|p| p.y).max().unwrap_or(0);

            // shoelace over the traced border
            let n = c.points.len();
            let twice_area: f64 = (0..n)
                .map(|i| {
                    let p = c.points[i];
                    let q = c.points[(i + 1) % n];
                    p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64
                })
                .sum();

            Blob {
                points: n,
                area: twice_area.abs() / 2.0,
                x: min_x as u32,
                y: min_y as u32,
                width: (max_x - min_x + 1) as u32,
                height: (max_y - min_y + 1) as u32,
            }
        })
        .collect()
}

// Crop `blob` out of `image` with a small margin, clamped to the image
pub fn crop(image: &GrayImage, blob: &Blob, margin: u32) -> GrayImage {
    let x = blob.x.saturating_sub(margin);
    let y = blob.y.saturating_sub(margin);
    let width = (blob.x + blob.width + margin).min(image.width()) - x;
    let height = (blob.y + blob.height + margin).min(image.height()) - y;
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}

fn map_gray(image: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = f(pixel[0]);
    }
    out
}
