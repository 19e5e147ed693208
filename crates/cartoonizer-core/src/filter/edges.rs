use image::{GrayImage, Luma, RgbImage};

/// BT.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

pub const EDGE: u8 = 0;
pub const BACKGROUND: u8 = 255;

/// Single-channel luminance of an RGB image.
pub fn luminance(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let y = (r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B
            + (1 << (LUMA_SHIFT - 1)))
            >> LUMA_SHIFT;
        Luma([y as u8])
    })
}

/// Median blur with a square `kernel`×`kernel` window.
pub fn median_blur(gray: &GrayImage, kernel: u32) -> GrayImage {
    assert!(kernel % 2 == 1, "median kernel must be odd, got {kernel}");
    let radius = kernel / 2;
    imageproc::filter::median_filter(gray, radius, radius)
}

/// Binarize against the local mean of a `block_size`×`block_size` box.
///
/// A pixel becomes [`EDGE`] when it is at or below `mean - c`, otherwise
/// [`BACKGROUND`]. Borders replicate the outermost row/column.
pub fn adaptive_threshold_mean(gray: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    assert!(
        block_size % 2 == 1 && block_size > 1,
        "block_size must be odd and > 1, got {block_size}"
    );

    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    let means = box_mean(gray, block_size / 2);
    GrayImage::from_fn(width, height, |x, y| {
        let pixel = gray.get_pixel(x, y)[0] as i32;
        let mean = means[(y * width + x) as usize] as i32;
        if pixel - mean > -c {
            Luma([BACKGROUND])
        } else {
            Luma([EDGE])
        }
    })
}

/// Rounded box mean with replicated borders, computed as two separable passes.
fn box_mean(gray: &GrayImage, radius: u32) -> Vec<u8> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as i64, height as i64);
    let r = radius as i64;
    let area = ((2 * r + 1) * (2 * r + 1)) as u32;
    let src = gray.as_raw();

    let mut rows = vec![0u32; src.len()];
    for y in 0..h {
        let row = &src[(y * w) as usize..((y + 1) * w) as usize];
        for x in 0..w {
            rows[(y * w + x) as usize] = (x - r..=x + r)
                .map(|nx| row[nx.clamp(0, w - 1) as usize] as u32)
                .sum();
        }
    }

    let mut means = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let sum: u32 = (y - r..=y + r)
                .map(|ny| rows[(ny.clamp(0, h - 1) * w + x) as usize])
                .sum();
            means[(y * w + x) as usize] = ((sum + area / 2) / area) as u8;
        }
    }
    means
}
