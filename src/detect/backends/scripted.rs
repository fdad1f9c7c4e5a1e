use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One canned reply of a `ScriptedBackend`.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Detector that replays a fixed script, one reply per `detect` call.
///
/// Once the script runs out every call returns no detections. The backend
/// applies the confidence threshold itself, like a real model would.
pub struct ScriptedBackend {
    labels: Vec<String>,
    replies: VecDeque<ScriptedReply>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            replies: VecDeque::new(),
            calls: 0,
        }
    }

    /// Queue a reply containing one detection per `(label, confidence)`.
    pub fn then_detect(mut self, detections: &[(&str, f32)]) -> Self {
        self.replies.push_back(ScriptedReply::Detections(
            detections
                .iter()
                .map(|(label, confidence)| Detection::new(*label, *confidence))
                .collect(),
        ));
        self
    }

    pub fn then_nothing(mut self) -> Self {
        self.replies.push_back(ScriptedReply::Detections(Vec::new()));
        self
    }

    pub fn then_reply(mut self, reply: ScriptedReply) -> Self {
        self.replies.push_back(reply);
        self
    }

    pub fn then_fail(mut self, message: &str) -> Self {
        self.replies.push_back(ScriptedReply::Fail(message.to_string()));
        self
    }

    /// Number of `detect` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.replies.pop_front() {
            Some(ScriptedReply::Detections(detections)) => Ok(detections
                .into_iter()
                .filter(|d| d.confidence >= min_confidence)
                .collect()),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_goes_quiet() {
        let frame = Frame::solid(1, 1, [0, 0, 0]);
        let mut backend = ScriptedBackend::new(vec!["person".into()])
            .then_detect(&[("person", 0.9), ("person", 0.2)])
            .then_fail("boom");

        let first = backend.detect(&frame, 0.5).unwrap();
        assert_eq!(first.len(), 1);
        assert!(backend.detect(&frame, 0.5).is_err());
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
    }
}
