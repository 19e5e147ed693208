use std::fmt::{self, Formatter};

use image::{Rgb, RgbImage};

/// HSV representation. H in [0, 360), S and V in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[H: {:.0}°, S: {:.2}, V: {:.2}]", self.h, self.s, self.v)
    }
}

impl Hsv {
    /// Raise saturation by `amount` 8-bit steps, clamped at full saturation.
    pub fn with_saturation_boost(self, amount: u8) -> Hsv {
        Hsv {
            s: (self.s + amount as f32 / 255.0).min(1.0),
            ..self
        }
    }
}

pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta < 1e-6 {
        0.0
    } else if (max - r).abs() < 1e-6 {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < 1e-6 {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };

    let h = if h < 0.0 { h + 360.0 } else { h };

    Hsv { h, s, v }
}

pub fn hsv_to_rgb(hsv: Hsv) -> Rgb<u8> {
    let c = hsv.v * hsv.s;
    let sector = (hsv.h / 60.0).rem_euclid(6.0);
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let m = hsv.v - c;

    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_u8 = |ch: f32| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Raise every pixel's saturation by `amount` (8-bit scale), keeping hue and value.
pub fn boost_saturation(image: &RgbImage, amount: u8) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b] = pixel.0;
        *pixel = hsv_to_rgb(rgb_to_hsv(r, g, b).with_saturation_boost(amount));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Rgb<u8>, b: Rgb<u8>) {
        for c in 0..3 {
            assert!(a[c].abs_diff(b[c]) <= 1, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn primaries_round_trip() {
        for rgb in [
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [255, 255, 0],
            [0, 255, 255],
            [255, 0, 255],
            [200, 100, 50],
            [12, 200, 180],
            [0, 0, 0],
            [255, 255, 255],
        ] {
            let hsv = rgb_to_hsv(rgb[0], rgb[1], rgb[2]);
            assert_close(hsv_to_rgb(hsv), Rgb(rgb));
        }
    }

    #[test]
    fn hue_of_known_colors() {
        assert_eq!(rgb_to_hsv(255, 0, 0).h, 0.0);
        assert!((rgb_to_hsv(0, 255, 0).h - 120.0).abs() < 1e-3);
        assert!((rgb_to_hsv(0, 0, 255).h - 240.0).abs() < 1e-3);
        assert!((rgb_to_hsv(255, 0, 128).h - 329.9).abs() < 0.2);
    }

    #[test]
    fn saturation_boost_stays_within_fifteen_steps() {
        let step = 15.0 / 255.0;
        for rgb in [[10, 10, 10], [200, 100, 50], [250, 0, 0], [90, 80, 70], [0, 0, 0]] {
            let before = rgb_to_hsv(rgb[0], rgb[1], rgb[2]);
            let after = before.with_saturation_boost(15);
            assert!(after.s >= before.s);
            assert!(after.s <= (before.s + step).min(1.0) + 1e-6);
            assert_eq!(after.h, before.h);
            assert_eq!(after.v, before.v);
        }
    }

    #[test]
    fn saturation_clamps_at_maximum() {
        let full = rgb_to_hsv(255, 0, 0);
        assert_eq!(full.s, 1.0);
        assert_eq!(full.with_saturation_boost(15).s, 1.0);
        assert_eq!(hsv_to_rgb(full.with_saturation_boost(15)), Rgb([255, 0, 0]));
    }

    #[test]
    fn boost_tints_gray_and_keeps_black() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([128, 128, 128])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = boost_saturation(&img, 15);
        assert_eq!(out.get_pixel(0, 0), &Rgb([128, 120, 120]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boosted_image_saturation_stays_in_range() {
        let levels: Vec<u8> = (0..=255u32).step_by(5).map(|v| v as u8).collect();
        let n = levels.len() as u32;
        let img = RgbImage::from_fn(n * n, n, |x, y| {
            Rgb([levels[(x / n) as usize], levels[(x % n) as usize], levels[y as usize]])
        });
        let out = boost_saturation(&img, 15);
        let step = 15.0 / 255.0;

        for (a, b) in img.pixels().zip(out.pixels()) {
            let max = a.0.iter().max().copied().unwrap_or(0);
            if max == 0 {
                assert_eq!(b.0, [0, 0, 0]);
                continue;
            }
            let before = rgb_to_hsv(a[0], a[1], a[2]).s;
            let after = rgb_to_hsv(b[0], b[1], b[2]).s;
            // Rounding the smallest channel back to 8 bits moves S by at most half a step of `max`.
            let slack = if max >= 128 { 1.0 / 255.0 } else { 0.5 / max as f32 + 1e-5 };
            assert!(after >= before - slack, "{a:?} -> {b:?}: S {before} -> {after}");
            assert!(
                after <= (before + step).min(1.0) + slack,
                "{a:?} -> {b:?}: S {before} -> {after}"
            );
        }
    }

    #[test]
    fn boost_never_raises_a_channel() {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, ((x * 7 + y * 3) * 5 % 256) as u8])
        });
        let out = boost_saturation(&img, 15);
        for (a, b) in img.pixels().zip(out.pixels()) {
            let max_before = a.0.iter().max().copied().unwrap_or(0);
            let max_after = b.0.iter().max().copied().unwrap_or(0);
            assert!(max_before.abs_diff(max_after) <= 1, "{a:?} -> {b:?}");
            for c in 0..3 {
                assert!(b[c] <= a[c].saturating_add(1), "{a:?} -> {b:?}");
            }
        }
    }
}
