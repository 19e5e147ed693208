use image::RgbImage;

/// Largest possible range distance: sum of three 8-bit channel differences.
const MAX_COLOR_DISTANCE: usize = 3 * 255;

/// Edge-preserving smoothing over a circular neighborhood.
///
/// Each neighbor is weighted by a spatial gaussian on its distance from the
/// center and a range gaussian on the summed absolute channel difference, so
/// flat regions blur while strong color edges survive. Lookup tables are
/// built once and the filter can be reused across frames.
#[derive(Debug, Clone)]
pub struct BilateralFilter {
    /// (dx, dy, spatial weight) for every offset inside the circle.
    space: Vec<(i32, i32, f32)>,
    /// Range weight indexed by summed absolute channel difference.
    color: Vec<f32>,
}

impl BilateralFilter {
    pub fn new(diameter: u32, sigma_color: f32, sigma_space: f32) -> Self {
        assert!(sigma_color > 0.0, "sigma_color must be > 0, got {sigma_color}");
        assert!(sigma_space > 0.0, "sigma_space must be > 0, got {sigma_space}");

        let radius = (diameter / 2).max(1) as i32;
        let space_coeff = -0.5 / (sigma_space * sigma_space);
        let color_coeff = -0.5 / (sigma_color * sigma_color);

        let mut space = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let r2 = (dx * dx + dy * dy) as f32;
                if r2.sqrt() > radius as f32 {
                    continue;
                }
                space.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }

        let color = (0..=MAX_COLOR_DISTANCE)
            .map(|d| {
                let d = d as f32;
                (d * d * color_coeff).exp()
            })
            .collect();

        Self { space, color }
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let w = width as i32;
        let h = height as i32;
        let src = image.as_raw();

        RgbImage::from_fn(width, height, |x, y| {
            let center_idx = (y as usize * width as usize + x as usize) * 3;
            let center = &src[center_idx..center_idx + 3];

            let mut sum = [0f32; 3];
            let mut weight_sum = 0f32;

            for &(dx, dy, space_weight) in &self.space {
                let nx = reflect_101(x as i32 + dx, w);
                let ny = reflect_101(y as i32 + dy, h);
                let idx = (ny as usize * width as usize + nx as usize) * 3;
                let neighbor = &src[idx..idx + 3];

                let distance = (0..3)
                    .map(|c| neighbor[c].abs_diff(center[c]) as usize)
                    .sum::<usize>();
                let weight = space_weight * self.color[distance];

                for c in 0..3 {
                    sum[c] += weight * neighbor[c] as f32;
                }
                weight_sum += weight;
            }

            // The center always contributes weight 1, so weight_sum > 0.
            image::Rgb(sum.map(|s| (s / weight_sum).round().clamp(0.0, 255.0) as u8))
        })
    }
}

/// One-shot bilateral filter with freshly built tables.
pub fn bilateral_filter(
    image: &RgbImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    BilateralFilter::new(diameter, sigma_color, sigma_space).apply(image)
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
/// sample (`-1 -> 1`, `len -> len - 2`).
pub(crate) fn reflect_101(mut i: i32, len: i32) -> u32 {
    assert!(len > 0, "reflect_101 on empty axis");
    if len == 1 {
        return 0;
    }
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * (len - 1) - i;
        }
    }
    i as u32
}
