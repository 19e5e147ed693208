use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, info};

use crate::video::frame::Frame;

const SEPARATOR_WIDTH: u32 = 4;
const SEPARATOR_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

/// Writes side-by-side comparison images (original left, stylized right).
pub struct DebugRenderer {
    dir: PathBuf,
}

impl DebugRenderer {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create debug frames directory {}", dir.display()))?;
        info!(?dir, "debug frames directory ready");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn save_frame(&self, frame: &Frame, stylized: &RgbImage) -> Result<PathBuf> {
        let img = compose_side_by_side(&frame.image, stylized);

        let path = self.dir.join(format!("frame_{:08}.png", frame.frame_number));
        img.save(&path)
            .with_context(|| format!("failed to save debug frame to {}", path.display()))?;

        debug!(?path, "saved debug frame");
        Ok(path)
    }
}

fn compose_side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + SEPARATOR_WIDTH + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::new(width, height);

    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, (left.width() + SEPARATOR_WIDTH) as i64, 0);

    if height > 0 {
        let separator = Rect::at(left.width() as i32, 0).of_size(SEPARATOR_WIDTH, height);
        draw_filled_rect_mut(&mut canvas, separator, SEPARATOR_COLOR);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_by_side_layout() {
        let left = RgbImage::from_pixel(5, 3, Rgb([10, 10, 10]));
        let right = RgbImage::from_pixel(5, 3, Rgb([200, 200, 200]));
        let img = compose_side_by_side(&left, &right);

        assert_eq!(img.dimensions(), (14, 3));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(img.get_pixel(5, 1), &SEPARATOR_COLOR);
        assert_eq!(img.get_pixel(8, 2), &SEPARATOR_COLOR);
        assert_eq!(img.get_pixel(9, 0), &Rgb([200, 200, 200]));
        assert_eq!(img.get_pixel(13, 2), &Rgb([200, 200, 200]));
    }

    #[test]
    fn save_frame_writes_numbered_png() {
        let tmp = tempfile::tempdir().unwrap();
        let renderer = DebugRenderer::new(&tmp.path().join("debug")).unwrap();
        let frame = Frame::new(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])), 42, 24.0);

        let path = renderer.save_frame(&frame, &frame.image).unwrap();
        assert_eq!(path.file_name().unwrap(), "frame_00000042.png");
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (12, 4));
    }
}
