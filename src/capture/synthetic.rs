//! A camera stand-in that paints vocabulary color cards.

use chrono::Utc;
use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FrameSource, FrameSubscription};
use crate::common::Frame;
use crate::error::CaptureError;

/// Mid-gray card that no vocabulary entry matches.
pub const NEUTRAL_CARD: [u8; 3] = [127, 127, 127];

/// A solid color held in front of the camera for a run of frames.
#[derive(Debug, Clone, Copy)]
pub struct ScriptCard {
    color: [u8; 3],
    hold_frames: u32,
}

impl ScriptCard {
    pub fn new(color: [u8; 3], hold_frames: u32) -> Self {
        Self {
            color,
            hold_frames: hold_frames.max(1),
        }
    }
}

/// Paces frames like a real camera and paints scripted color cards,
/// cycling through the script until unsubscribed or the frame limit is
/// reached.
pub struct SyntheticCamera {
    script: Vec<ScriptCard>,
    fps: u32,
    width: u32,
    height: u32,
    noise: u8,
    frame_limit: Option<u64>,
    channel_capacity: usize,
}

impl SyntheticCamera {
    pub fn new(script: Vec<ScriptCard>) -> Self {
        Self {
            script,
            fps: 30,
            width: 64,
            height: 64,
            noise: 0,
            frame_limit: None,
            channel_capacity: 60,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Per-channel pixel jitter, to keep classifiers honest.
    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    /// Ends delivery after this many frames instead of cycling forever.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

#[async_trait::async_trait]
impl FrameSource for SyntheticCamera {
    async fn subscribe(&self) -> Result<FrameSubscription, CaptureError> {
        if self.script.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "camera script is empty".to_string(),
            ));
        }
        let (frame_tx, frame_rx) = mpsc::channel(self.channel_capacity);
        let stop = CancellationToken::new();
        let producer = Producer {
            frame_tx,
            script: self.script.clone(),
            fps: self.fps,
            width: self.width,
            height: self.height,
            noise: self.noise,
            frame_limit: self.frame_limit,
            id: Uuid::new_v4(),
            seq: 0,
            card_index: 0,
            held: 0,
        };
        tokio::spawn(producer.run(stop.clone()));
        Ok(FrameSubscription::new(frame_rx, stop))
    }
}

struct Producer {
    frame_tx: mpsc::Sender<Frame>,
    script: Vec<ScriptCard>,
    fps: u32,
    width: u32,
    height: u32,
    noise: u8,
    frame_limit: Option<u64>,
    id: Uuid,
    seq: u64,
    card_index: usize,
    held: u32,
}

impl Producer {
    async fn run(mut self, stop: CancellationToken) {
        info!(camera = %self.id, fps = self.fps, "synthetic camera started");
        let mut ticker = time::interval(Duration::from_secs(1) / self.fps);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!(camera = %self.id, "synthetic camera unsubscribed");
                    break;
                }
                _ = ticker.tick() => {
                    if self.frame_limit.is_some_and(|limit| self.seq >= limit) {
                        info!(camera = %self.id, frames = self.seq, "synthetic camera finished");
                        break;
                    }
                    let frame = self.next_frame();
                    match self.frame_tx.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // Drop the frame to stay real-time.
                            warn!(camera = %self.id, "frame channel full, dropping frame");
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!(camera = %self.id, "frame channel closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn next_frame(&mut self) -> Frame {
        let card = self.script[self.card_index % self.script.len()];
        self.held += 1;
        if self.held >= card.hold_frames {
            self.held = 0;
            self.card_index += 1;
        }
        let mut rgb = RgbImage::from_pixel(self.width, self.height, Rgb(card.color));
        if self.noise > 0 {
            let mut rng = rand::rng();
            let spread = i16::from(self.noise);
            for pixel in rgb.pixels_mut() {
                for c in 0..3 {
                    let jitter = rng.random_range(-spread..=spread);
                    pixel.0[c] = (i16::from(pixel.0[c]) + jitter).clamp(0, 255) as u8;
                }
            }
        }
        let frame = Frame::new(self.seq, DynamicImage::ImageRgb8(rgb), Utc::now());
        self.seq += 1;
        frame
    }
}
