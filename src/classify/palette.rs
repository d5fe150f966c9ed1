//! A deterministic stand-in for a trained sign model.
//!
//! Reads the mean color of the frame and snaps it to the nearest
//! vocabulary color card. Useful for demos and end-to-end tests where a
//! real model is unavailable.

use async_trait::async_trait;

use super::Classifier;
use crate::common::Frame;
use crate::error::ClassifyError;
use crate::pipeline::types::DetectionLabel;

/// Squared-distance ceiling for a match; beyond it the frame counts as
/// "no sign visible".
const MATCH_THRESHOLD: u32 = 4000;

/// The color card a label is keyed to. The synthetic camera paints these.
pub fn card_color(label: DetectionLabel) -> [u8; 3] {
    match label {
        DetectionLabel::Hello => [220, 60, 50],
        DetectionLabel::ThankYou => [50, 180, 90],
        DetectionLabel::HowAreYou => [60, 90, 220],
        DetectionLabel::MyNameIs => [230, 200, 60],
        DetectionLabel::NiceToMeetYou => [160, 70, 200],
    }
}

fn color_distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    (0..3).fold(0u32, |acc, c| {
        let delta = i32::from(a[c]) - i32::from(b[c]);
        acc + (delta * delta) as u32
    })
}

pub struct PaletteClassifier {
    pixel_step: u32,
}

impl PaletteClassifier {
    /// `high_accuracy` samples every pixel; the fast path walks a 4-pixel
    /// grid.
    pub fn new(high_accuracy: bool) -> Self {
        Self {
            pixel_step: if high_accuracy { 1 } else { 4 },
        }
    }

    fn mean_color(&self, frame: &Frame) -> Option<[u8; 3]> {
        let rgb = frame.image().to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for y in (0..height).step_by(self.pixel_step as usize) {
            for x in (0..width).step_by(self.pixel_step as usize) {
                let pixel = rgb.get_pixel(x, y);
                for c in 0..3 {
                    sum[c] += u64::from(pixel.0[c]);
                }
                count += 1;
            }
        }
        Some([
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        ])
    }
}

impl Default for PaletteClassifier {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Classifier for PaletteClassifier {
    async fn classify(&self, frame: &Frame) -> Result<Option<DetectionLabel>, ClassifyError> {
        let Some(mean) = self.mean_color(frame) else {
            return Err(ClassifyError::Backend("empty frame".to_string()));
        };
        let mut best_label = DetectionLabel::ALL[0];
        let mut best_distance = color_distance_sq(card_color(best_label), mean);
        for label in &DetectionLabel::ALL[1..] {
            let distance = color_distance_sq(card_color(*label), mean);
            if distance < best_distance {
                best_label = *label;
                best_distance = distance;
            }
        }
        Ok((best_distance <= MATCH_THRESHOLD).then_some(best_label))
    }

    fn name(&self) -> &'static str {
        "palette"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

    fn solid_frame(color: [u8; 3]) -> Frame {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(color)));
        Frame::new(0, img, Utc::now())
    }

    #[tokio::test]
    async fn recognizes_every_card_in_both_modes() {
        for high_accuracy in [false, true] {
            let classifier = PaletteClassifier::new(high_accuracy);
            for label in DetectionLabel::ALL {
                let result = classifier.classify(&solid_frame(card_color(label))).await;
                assert_eq!(result.ok().flatten(), Some(label));
            }
        }
    }

    #[tokio::test]
    async fn neutral_gray_is_no_sign() {
        let classifier = PaletteClassifier::default();
        let result = classifier.classify(&solid_frame([127, 127, 127])).await;
        assert_eq!(result.ok().flatten(), None);
    }

    #[tokio::test]
    async fn tolerates_moderate_pixel_noise() {
        // Checkerboard the card color a few steps up and down; the mean
        // stays on the card.
        let base = card_color(DetectionLabel::ThankYou);
        let img = ImageBuffer::from_fn(32, 32, |x, y| {
            let offset: i16 = if (x + y) % 2 == 0 { 6 } else { -6 };
            let mut px = [0u8; 3];
            for c in 0..3 {
                px[c] = (i16::from(base[c]) + offset).clamp(0, 255) as u8;
            }
            Rgb(px)
        });
        let frame = Frame::new(0, DynamicImage::ImageRgb8(img), Utc::now());
        let result = PaletteClassifier::default().classify(&frame).await;
        assert_eq!(result.ok().flatten(), Some(DetectionLabel::ThankYou));
    }

    #[tokio::test]
    async fn empty_frames_are_a_backend_error() {
        let frame = Frame::new(0, DynamicImage::new_rgb8(0, 0), Utc::now());
        let result = PaletteClassifier::default().classify(&frame).await;
        assert!(matches!(result, Err(ClassifyError::Backend(_))));
    }
}
