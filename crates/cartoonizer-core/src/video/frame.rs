use image::RgbImage;

/// A single decoded video frame with metadata.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame's image data.
    pub image: RgbImage,
    /// Frame number from the start of the source (0-based).
    pub frame_number: u32,
    /// Elapsed seconds from the start of the source.
    pub timestamp_seconds: f64,
}

impl Frame {
    pub fn new(image: RgbImage, frame_number: u32, fps: f64) -> Self {
        let timestamp_seconds = if fps > 0.0 {
            frame_number as f64 / fps
        } else {
            0.0
        };
        Self {
            image,
            frame_number,
            timestamp_seconds,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
