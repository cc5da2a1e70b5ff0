//! Image preprocessing for OCR.

use image::{DynamicImage, Rgba};
use tracing::debug;

/// Relative luminance of an RGB pixel (Rec. 709 weights).
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.2126 * f32::from(r) + 0.7152 * f32::from(g) + 0.0722 * f32::from(b)
}

/// Force pixels brighter than `threshold` to pure white.
///
/// Darker pixels keep their original color. This whitens paper background
/// and light noise without full adaptive thresholding.
pub fn binarize(image: &DynamicImage, threshold: u8) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    let limit = f32::from(threshold);
    let mut whitened = 0usize;

    for pixel in rgba.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        if luminance(r, g, b) > limit {
            *pixel = Rgba([255, 255, 255, a]);
            whitened += 1;
        }
    }

    debug!(
        "Binarized {}x{} image, {} pixels whitened",
        rgba.width(),
        rgba.height(),
        whitened
    );
    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_luminance_weights() {
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-3);
        assert!((luminance(100, 0, 0) - 21.26).abs() < 1e-3);
        assert_eq!(luminance(0, 0, 0), 0.0);
    }

    #[test]
    fn test_binarize_whitens_only_bright_pixels() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([200, 200, 200, 255]));
        img.put_pixel(1, 0, Rgba([160, 160, 160, 255]));
        img.put_pixel(2, 0, Rgba([250, 10, 10, 255]));

        let out = binarize(&DynamicImage::ImageRgba8(img), 160).to_rgba8();

        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
        // Exactly at the threshold is not brighter than it.
        assert_eq!(out.get_pixel(1, 0).0, [160, 160, 160, 255]);
        // Bright red is dark by luminance.
        assert_eq!(out.get_pixel(2, 0).0, [250, 10, 10, 255]);
    }

    #[test]
    fn test_binarize_is_idempotent() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([180, 180, 180, 255]));
        img.put_pixel(1, 1, Rgba([40, 60, 80, 255]));
        let once = binarize(&DynamicImage::ImageRgba8(img), 160);
        let twice = binarize(&once, 160);
        assert_eq!(once.to_rgba8(), twice.to_rgba8());
    }
}
