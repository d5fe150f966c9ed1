//! The classifier seam.
//!
//! The model itself is external to the loop; it is reached through the
//! [`Classifier`] contract and wrapped in a `tower` timeout so one slow
//! call can never wedge the pipeline.

mod palette;

pub use palette::{card_color, PaletteClassifier};

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tower::timeout::Timeout;
use tower::{Service, ServiceExt};

use crate::common::Frame;
use crate::error::ClassifyError;
use crate::pipeline::types::DetectionLabel;

/// Maps one frame to a vocabulary label, or `None` when no sign is
/// recognized. Implementations must not panic; failures surface through
/// the error and are treated as a "none" result by the loop.
///
/// The loop issues at most one call at a time per instance, but handles
/// may be shared, so implementations take `&self`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<Option<DetectionLabel>, ClassifyError>;

    fn name(&self) -> &'static str {
        "classifier"
    }
}

/// `tower::Service` adapter over a shared classifier.
#[derive(Clone)]
pub struct ClassifierService {
    inner: Arc<dyn Classifier>,
}

impl ClassifierService {
    pub fn new(inner: Arc<dyn Classifier>) -> Self {
        Self { inner }
    }
}

impl Service<Frame> for ClassifierService {
    type Response = Option<DetectionLabel>;
    type Error = ClassifyError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: Frame) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { inner.classify(&frame).await })
    }
}

/// A classifier with the classification deadline applied.
pub type ClassifierStack = Timeout<ClassifierService>;

pub fn classification_stack(classifier: Arc<dyn Classifier>, deadline: Duration) -> ClassifierStack {
    Timeout::new(ClassifierService::new(classifier), deadline)
}

/// Runs one classification through the stack, folding tower's boxed error
/// back into the crate taxonomy.
pub async fn classify_one(
    stack: ClassifierStack,
    frame: Frame,
    deadline: Duration,
) -> Result<Option<DetectionLabel>, ClassifyError> {
    stack
        .oneshot(frame)
        .await
        .map_err(|err| into_classify_error(err, deadline))
}

fn into_classify_error(err: tower::BoxError, deadline: Duration) -> ClassifyError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return ClassifyError::Timeout(deadline);
    }
    match err.downcast::<ClassifyError>() {
        Ok(class) => *class,
        Err(other) => ClassifyError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::DynamicImage;

    struct FixedClassifier(Result<Option<DetectionLabel>, ClassifyError>);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _frame: &Frame,
        ) -> Result<Option<DetectionLabel>, ClassifyError> {
            match &self.0 {
                Ok(label) => Ok(*label),
                Err(ClassifyError::Backend(msg)) => Err(ClassifyError::Backend(msg.clone())),
                Err(ClassifyError::Timeout(deadline)) => Err(ClassifyError::Timeout(*deadline)),
            }
        }
    }

    struct StuckClassifier;

    #[async_trait]
    impl Classifier for StuckClassifier {
        async fn classify(
            &self,
            _frame: &Frame,
        ) -> Result<Option<DetectionLabel>, ClassifyError> {
            futures::future::pending().await
        }
    }

    fn blank_frame() -> Frame {
        Frame::new(0, DynamicImage::new_rgb8(8, 8), Utc::now())
    }

    #[tokio::test]
    async fn labels_pass_through_the_stack() {
        let deadline = Duration::from_millis(100);
        let stack = classification_stack(
            Arc::new(FixedClassifier(Ok(Some(DetectionLabel::Hello)))),
            deadline,
        );
        let label = classify_one(stack, blank_frame(), deadline).await;
        assert!(matches!(label, Ok(Some(DetectionLabel::Hello))));
    }

    #[tokio::test]
    async fn backend_errors_keep_their_identity() {
        let deadline = Duration::from_millis(100);
        let stack = classification_stack(
            Arc::new(FixedClassifier(Err(ClassifyError::Backend(
                "model crashed".to_string(),
            )))),
            deadline,
        );
        let err = classify_one(stack, blank_frame(), deadline).await;
        match err {
            Err(ClassifyError::Backend(msg)) => assert_eq!(msg, "model crashed"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_classifications_time_out() {
        let deadline = Duration::from_millis(250);
        let stack = classification_stack(Arc::new(StuckClassifier), deadline);
        let err = classify_one(stack, blank_frame(), deadline).await;
        assert!(matches!(err, Err(ClassifyError::Timeout(d)) if d == deadline));
    }
}
