//! Image normalization: mode flattening + bounded resize.
//!
//! Every decoded image passes through here before persistence. Two
//! transforms, both deterministic:
//!
//! - **Mode**: alpha-bearing images (straight alpha, or palette sources
//!   whose transparency key the decoder expanded into alpha) are composited
//!   onto an opaque white background through their alpha channel; any other
//!   non-RGB mode converts directly to three-channel color. Downstream
//!   consumers and lossy encodings cannot represent transparency, and white
//!   is a deterministic, visually neutral fill.
//! - **Size**: images exceeding the configured bounds scale down by
//!   `ratio = min(max_w/w, max_h/h)` with Lanczos3 resampling, dimensions
//!   rounded to nearest (1 px floor). Images within bounds keep their native
//!   resolution — this pipeline never upscales.
//!
//! The decision of *what* to do is split from the pixel work: [`plan`] is a
//! pure function over color mode and dimensions, unit-testable without
//! touching pixels, and [`normalize`] executes a plan.

use crate::config::LimitsConfig;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Rgba, RgbaImage};

/// What normalization will do to an image, decided before any pixel work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePlan {
    /// Composite onto a white background through the alpha channel.
    pub flatten: bool,
    /// Convert directly to RGB (no alpha to composite).
    pub convert: bool,
    /// Target dimensions if the image exceeds the configured bounds.
    pub resize_to: Option<(u32, u32)>,
}

/// Compute the bounded dimensions for an oversized image.
///
/// Returns `None` when the image already fits — callers must not resize in
/// that case. The scale ratio is applied uniformly to both axes, so aspect
/// ratio survives to within rounding.
pub fn fit_within(dimensions: (u32, u32), limits: &LimitsConfig) -> Option<(u32, u32)> {
    let (width, height) = dimensions;
    if width <= limits.max_width && height <= limits.max_height {
        return None;
    }
    let ratio = f64::min(
        limits.max_width as f64 / width as f64,
        limits.max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);
    Some((new_width, new_height))
}

/// Decide what [`normalize`] will do, without doing it.
pub fn plan(color: ColorType, dimensions: (u32, u32), limits: &LimitsConfig) -> NormalizePlan {
    let flatten = color.has_alpha();
    NormalizePlan {
        flatten,
        convert: !flatten && color != ColorType::Rgb8,
        resize_to: fit_within(dimensions, limits),
    }
}

/// Composite an image onto an opaque white background through its alpha
/// channel, yielding three-channel color.
pub fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    let mut background =
        RgbaImage::from_pixel(image.width(), image.height(), Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut background, &image.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(background).to_rgb8().into()
}

/// Normalize a decoded image for persistence: flatten/convert the color
/// mode, then scale down if either dimension exceeds the configured bounds.
pub fn normalize(image: &DynamicImage, limits: &LimitsConfig) -> DynamicImage {
    let plan = plan(image.color(), (image.width(), image.height()), limits);

    let mut normalized = if plan.flatten {
        flatten_onto_white(image)
    } else if plan.convert {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image.clone()
    };

    if let Some((width, height)) = plan.resize_to {
        normalized = normalized.resize_exact(width, height, FilterType::Lanczos3);
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, LumaA, Rgb, RgbImage};

    fn limits(max_width: u32, max_height: u32) -> LimitsConfig {
        LimitsConfig {
            max_width,
            max_height,
        }
    }

    // =========================================================================
    // fit_within
    // =========================================================================

    #[test]
    fn within_bounds_is_untouched() {
        assert_eq!(fit_within((800, 600), &limits(2048, 2048)), None);
    }

    #[test]
    fn exactly_at_bounds_is_untouched() {
        assert_eq!(fit_within((2048, 2048), &limits(2048, 2048)), None);
    }

    #[test]
    fn oversized_landscape_scales_to_max_width() {
        // 4000x3000 with 2048 cap: ratio 0.512 → 2048x1536
        assert_eq!(
            fit_within((4000, 3000), &limits(2048, 2048)),
            Some((2048, 1536))
        );
    }

    #[test]
    fn oversized_portrait_scales_to_max_height() {
        assert_eq!(
            fit_within((3000, 4000), &limits(2048, 2048)),
            Some((1536, 2048))
        );
    }

    #[test]
    fn one_oversized_axis_is_enough() {
        // Width fits, height doesn't
        assert_eq!(
            fit_within((1000, 4096), &limits(2048, 2048)),
            Some((500, 2048))
        );
    }

    #[test]
    fn aspect_ratio_survives_within_rounding() {
        let (w, h) = fit_within((3872, 2592), &limits(2048, 2048)).unwrap();
        assert!(w <= 2048 && h <= 2048);
        let original = 3872.0 / 2592.0;
        let scaled = w as f64 / h as f64;
        assert!((original - scaled).abs() < 0.01, "{original} vs {scaled}");
    }

    #[test]
    fn extreme_ratio_clamps_to_one_pixel() {
        // 1x10000 scaled by 0.2048 would round width to 0
        assert_eq!(
            fit_within((1, 10000), &limits(2048, 2048)),
            Some((1, 2048))
        );
    }

    // =========================================================================
    // plan
    // =========================================================================

    #[test]
    fn rgb_within_bounds_plans_nothing() {
        let p = plan(ColorType::Rgb8, (800, 600), &limits(2048, 2048));
        assert_eq!(
            p,
            NormalizePlan {
                flatten: false,
                convert: false,
                resize_to: None
            }
        );
    }

    #[test]
    fn alpha_modes_plan_flattening() {
        assert!(plan(ColorType::Rgba8, (10, 10), &limits(2048, 2048)).flatten);
        assert!(plan(ColorType::La8, (10, 10), &limits(2048, 2048)).flatten);
    }

    #[test]
    fn grayscale_plans_direct_conversion() {
        let p = plan(ColorType::L8, (10, 10), &limits(2048, 2048));
        assert!(!p.flatten);
        assert!(p.convert);
    }

    #[test]
    fn oversized_plans_resize() {
        let p = plan(ColorType::Rgb8, (4096, 100), &limits(2048, 2048));
        assert_eq!(p.resize_to, Some((2048, 50)));
    }

    // =========================================================================
    // flatten_onto_white
    // =========================================================================

    #[test]
    fn transparent_pixels_become_white() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img));

        assert_eq!(flat.color(), ColorType::Rgb8);
        let rgb = flat.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn luma_alpha_flattens_to_rgb() {
        let img = image::GrayAlphaImage::from_pixel(3, 3, LumaA([128, 0]));
        let flat = flatten_onto_white(&DynamicImage::ImageLumaA8(img));
        assert_eq!(flat.color(), ColorType::Rgb8);
        // Fully transparent gray disappears into the background
        assert_eq!(flat.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    // =========================================================================
    // normalize
    // =========================================================================

    #[test]
    fn opaque_rgb_within_bounds_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, Rgb([1, 2, 3])));
        let out = normalize(&img, &limits(2048, 2048));
        assert_eq!((out.width(), out.height()), (100, 80));
        assert_eq!(out.color(), ColorType::Rgb8);
        assert_eq!(out.to_rgb8().get_pixel(50, 40), &Rgb([1, 2, 3]));
    }

    #[test]
    fn grayscale_converts_to_rgb() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, image::Luma([77])));
        let out = normalize(&img, &limits(2048, 2048));
        assert_eq!(out.color(), ColorType::Rgb8);
        assert_eq!(out.to_rgb8().get_pixel(0, 0), &Rgb([77, 77, 77]));
    }

    #[test]
    fn oversized_image_is_bounded() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([9, 9, 9])));
        let out = normalize(&img, &limits(200, 200));
        assert_eq!((out.width(), out.height()), (200, 150));
    }

    #[test]
    fn small_image_is_never_upscaled() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([9, 9, 9])));
        let out = normalize(&img, &limits(2048, 2048));
        assert_eq!((out.width(), out.height()), (50, 50));
    }

    #[test]
    fn alpha_is_gone_after_normalize() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 128])));
        let out = normalize(&img, &limits(2048, 2048));
        assert!(!out.color().has_alpha());
    }
}
