//! Live frame acquisition.

mod synthetic;

pub use synthetic::{ScriptCard, SyntheticCamera, NEUTRAL_CARD};

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::common::Frame;
use crate::error::CaptureError;

/// A live source of frames (a camera, in production).
///
/// `subscribe` starts delivery and hands back the active subscription.
/// Permission problems surface here and are terminal for the caller.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn subscribe(&self) -> Result<FrameSubscription, CaptureError>;
}

/// A handle to an active frame stream.
///
/// Dropping the subscription cancels the producer, so delivery stops on
/// every exit path without an explicit unsubscribe call. Cancellation is
/// idempotent; a producer already gone is fine.
pub struct FrameSubscription {
    frames: ReceiverStream<Frame>,
    _unsubscribe: DropGuard,
}

impl FrameSubscription {
    /// Ties a frame channel to the token that stops its producer.
    pub fn new(frames: mpsc::Receiver<Frame>, stop: CancellationToken) -> Self {
        Self {
            frames: ReceiverStream::new(frames),
            _unsubscribe: stop.drop_guard(),
        }
    }

    /// Next frame; `None` once the source has shut down for good.
    pub async fn recv(&mut self) -> Option<Frame> {
        use tokio_stream::StreamExt;
        self.frames.next().await
    }
}

impl Stream for FrameSubscription {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::DynamicImage;

    #[tokio::test]
    async fn dropping_the_subscription_cancels_the_producer() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let subscription = FrameSubscription::new(frame_rx, token.clone());
        assert!(!token.is_cancelled());
        drop(subscription);
        assert!(token.is_cancelled());
        drop(frame_tx);
    }

    #[tokio::test]
    async fn drained_channel_ends_the_stream() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let mut subscription = FrameSubscription::new(frame_rx, CancellationToken::new());
        frame_tx
            .send(Frame::new(0, DynamicImage::new_rgb8(2, 2), Utc::now()))
            .await
            .unwrap_or_else(|_| panic!("receiver alive"));
        drop(frame_tx);
        assert_eq!(subscription.recv().await.map(|f| f.seq()), Some(0));
        assert!(subscription.recv().await.is_none());
    }
}
