//! Per-frame cartoon stylization.
//!
//! The pipeline is fixed: two bilateral smoothing passes on the color image,
//! an edge mask from the median-blurred luminance of the original frame,
//! masking edges to black, then a small saturation boost.

pub mod bilateral;
pub mod color;
pub mod edges;

use image::{GrayImage, Rgb, RgbImage};
use tracing::debug;

use self::bilateral::BilateralFilter;

pub const BILATERAL_DIAMETER: u32 = 9;
pub const BILATERAL_SIGMA_COLOR: f32 = 75.0;
pub const BILATERAL_SIGMA_SPACE: f32 = 75.0;
pub const BILATERAL_PASSES: usize = 2;
pub const MEDIAN_KERNEL: u32 = 7;
pub const THRESHOLD_BLOCK_SIZE: u32 = 9;
pub const THRESHOLD_OFFSET: i32 = 2;
pub const SATURATION_BOOST: u8 = 15;

/// Reusable cartoon filter. Holds only immutable lookup tables, so one
/// instance can serve every frame of a video.
#[derive(Debug, Clone)]
pub struct Cartoonizer {
    smoothing: BilateralFilter,
}

impl Default for Cartoonizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Cartoonizer {
    pub fn new() -> Self {
        Self {
            smoothing: BilateralFilter::new(
                BILATERAL_DIAMETER,
                BILATERAL_SIGMA_COLOR,
                BILATERAL_SIGMA_SPACE,
            ),
        }
    }

    /// Edge-preserving smoothing of the color image.
    pub fn smooth(&self, image: &RgbImage) -> RgbImage {
        let mut color = image.clone();
        for _ in 0..BILATERAL_PASSES {
            color = self.smoothing.apply(&color);
        }
        color
    }

    /// Binary mask of the original frame: 0 on edges, 255 elsewhere.
    pub fn edge_mask(&self, image: &RgbImage) -> GrayImage {
        let gray = edges::luminance(image);
        let blurred = edges::median_blur(&gray, MEDIAN_KERNEL);
        edges::adaptive_threshold_mean(&blurred, THRESHOLD_BLOCK_SIZE, THRESHOLD_OFFSET)
    }

    /// Stylize one frame. The output has the same dimensions as the input.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let color = self.smooth(image);
        let mask = self.edge_mask(image);
        let cartoon = apply_mask(&color, &mask);
        let out = color::boost_saturation(&cartoon, SATURATION_BOOST);

        debug!(
            width = out.width(),
            height = out.height(),
            edge_pixels = mask.pixels().filter(|p| p[0] == edges::EDGE).count(),
            "frame stylized"
        );
        out
    }
}

/// Stylize one frame with a default [`Cartoonizer`].
pub fn cartoonize(image: &RgbImage) -> RgbImage {
    Cartoonizer::new().apply(image)
}

/// Bitwise AND of every color channel with the single-channel mask.
pub fn apply_mask(color: &RgbImage, mask: &GrayImage) -> RgbImage {
    assert_eq!(
        color.dimensions(),
        mask.dimensions(),
        "mask must match color image dimensions"
    );
    RgbImage::from_fn(color.width(), color.height(), |x, y| {
        let m = mask.get_pixel(x, y)[0];
        let [r, g, b] = color.get_pixel(x, y).0;
        Rgb([r & m, g & m, b & m])
    })
}
