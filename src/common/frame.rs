use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::sync::Arc;

/// One sample from the live visual stream.
///
/// The pixel buffer is shared, so cloning a frame never copies image data.
/// Frames are owned transiently while the pipeline inspects them and are
/// dropped afterwards; nothing retains frame history.
#[derive(Clone)]
pub struct Frame {
    seq: u64,
    image: Arc<DynamicImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(seq: u64, image: DynamicImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            seq,
            image: Arc::new(image),
            captured_at,
        }
    }

    /// Monotonically increasing index assigned by the frame source.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let img: DynamicImage = DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(16, 16, Rgb([1, 2, 3])),
        );
        let f1 = Frame::new(7, img, Utc::now());
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
        assert_eq!(f2.seq(), 7);
    }
}
