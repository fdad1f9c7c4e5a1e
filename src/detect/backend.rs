use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector collaborator.
///
/// A detector maps one decoded frame to zero or more labelled, scored
/// detections. Model loading, weights and device selection belong to the
/// implementation; the classification engine only calls `detect`.
pub trait Detector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Label vocabulary in class-index order.
    fn labels(&self) -> &[String];

    /// Run detection on a frame, returning detections scoring at least
    /// `min_confidence`.
    fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>> {
        (**self).detect(frame, min_confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
