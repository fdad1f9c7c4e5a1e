//! Classification engine.
//!
//! Scans one video: every `frame_skip`-th frame (1-based counter) goes to the
//! detector, detections at or above the confidence threshold add their label
//! to the class set, and the scan stops as soon as every target label has
//! been seen. Each sampled frame is folded into the scan state by `evaluate`,
//! which returns a tagged `Step` instead of setting loop flags.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;

use crate::detect::{Detection, Detector};
use crate::error::ProcessError;
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceOpener};
use crate::suffix::ClassSet;

pub const DEFAULT_FRAME_SKIP: u32 = 10;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// What to do when one frame holds several instances of a label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MultiInstancePolicy {
    /// Plain presence classification; instance counts are ignored.
    #[default]
    Allow,
    /// Reject the whole video when a frame holds more than one `label`.
    Reject { label: String },
}

/// Sampling and decision parameters for one scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanSettings {
    pub frame_skip: u32,
    pub confidence: f32,
    /// Stop early once all of these labels have been seen.
    pub targets: Option<ClassSet>,
    pub multi_instance: MultiInstancePolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            frame_skip: DEFAULT_FRAME_SKIP,
            confidence: DEFAULT_CONFIDENCE,
            targets: None,
            multi_instance: MultiInstancePolicy::Allow,
        }
    }
}

impl ScanSettings {
    pub fn new(frame_skip: u32, confidence: f32) -> Self {
        Self {
            frame_skip,
            confidence,
            ..Self::default()
        }
    }

    /// Early-exit targets. An empty set disables early exit.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: ClassSet = targets.into_iter().map(Into::into).collect();
        self.targets = (!targets.is_empty()).then_some(targets);
        self
    }

    pub fn rejecting_multiple(mut self, label: impl Into<String>) -> Self {
        self.multi_instance = MultiInstancePolicy::Reject {
            label: label.into(),
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_skip == 0 {
            return Err(anyhow!("frame skip must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence threshold must lie in [0, 1], got {}",
                self.confidence
            ));
        }
        Ok(())
    }

    /// True when the 1-based frame `number` is submitted to the detector.
    pub fn is_sampled(&self, number: u64) -> bool {
        number % u64::from(self.frame_skip.max(1)) == 0
    }
}

/// Result of folding one sampled frame into the scan state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    EarlyStop,
    Reject { label: String, count: usize },
}

/// How a scan ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// Every frame was read.
    Exhausted,
    /// All target labels were seen before the end of the video.
    EarlyStop { frame: u64 },
    /// Decoding failed part-way; the class set covers the frames before it.
    Truncated { frame: u64 },
    /// A frame held several instances of a guarded label.
    Rejected {
        frame: u64,
        label: String,
        count: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub classes: ClassSet,
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub verdict: Verdict,
}

impl ScanReport {
    pub fn is_rejected(&self) -> bool {
        matches!(self.verdict, Verdict::Rejected { .. })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.classes.contains(label)
    }
}

/// Receives every sampled frame that passed the multi-instance check.
pub trait SampleSink {
    fn sampled(
        &mut self,
        frame_number: u64,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<(), ProcessError>;
}

/// Sink that ignores frames.
pub struct NoSink;

impl SampleSink for NoSink {
    fn sampled(&mut self, _: u64, _: &Frame, _: &[Detection]) -> Result<(), ProcessError> {
        Ok(())
    }
}

/// Fold the detections of one sampled frame into `classes`.
///
/// `detections` must already be filtered by the confidence threshold.
pub fn evaluate(classes: &mut ClassSet, detections: &[Detection], settings: &ScanSettings) -> Step {
    if let MultiInstancePolicy::Reject { label } = &settings.multi_instance {
        let count = detections.iter().filter(|d| &d.label == label).count();
        if count > 1 {
            return Step::Reject {
                label: label.clone(),
                count,
            };
        }
    }

    for detection in detections {
        classes.insert(detection.label.clone());
    }

    match &settings.targets {
        Some(targets) if targets.is_subset(classes) => Step::EarlyStop,
        _ => Step::Continue,
    }
}

/// Stride-sampling scanner bound to one detector.
pub struct ClassificationEngine<D> {
    detector: D,
    settings: ScanSettings,
}

impl<D: Detector> ClassificationEngine<D> {
    pub fn new(detector: D, settings: ScanSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { detector, settings })
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn into_detector(self) -> D {
        self.detector
    }

    /// Open `path` and scan it.
    pub fn scan_path(
        &mut self,
        opener: &dyn SourceOpener,
        path: &Path,
        sink: &mut dyn SampleSink,
    ) -> Result<ScanReport, ProcessError> {
        let mut source = opener
            .open(path)
            .map_err(|cause| ProcessError::unreadable(path, cause))?;
        self.scan(path, source.as_mut(), sink)
    }

    /// Scan an already opened source. `path` is only used for reporting.
    pub fn scan(
        &mut self,
        path: &Path,
        source: &mut dyn FrameSource,
        sink: &mut dyn SampleSink,
    ) -> Result<ScanReport, ProcessError> {
        let mut classes = ClassSet::new();
        let mut frames_read = 0u64;
        let mut frames_sampled = 0u64;

        let verdict = loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Verdict::Exhausted,
                Err(err) => {
                    log::warn!(
                        "{}: stopped reading after frame {}: {:#}",
                        path.display(),
                        frames_read,
                        err
                    );
                    break Verdict::Truncated { frame: frames_read };
                }
            };
            frames_read += 1;
            if !self.settings.is_sampled(frames_read) {
                continue;
            }
            frames_sampled += 1;

            let detections: Vec<Detection> = self
                .detector
                .detect(&frame, self.settings.confidence)
                .map_err(|cause| ProcessError::detector(path, frames_read, cause))?
                .into_iter()
                .filter(|d| d.confidence >= self.settings.confidence)
                .collect();
            for detection in &detections {
                log::debug!(
                    "frame {}: detected {} with confidence {:.2}",
                    frames_read,
                    detection.label,
                    detection.confidence
                );
            }

            match evaluate(&mut classes, &detections, &self.settings) {
                Step::Reject { label, count } => {
                    break Verdict::Rejected {
                        frame: frames_read,
                        label,
                        count,
                    };
                }
                step => {
                    sink.sampled(frames_read, &frame, &detections)?;
                    if step == Step::EarlyStop {
                        break Verdict::EarlyStop { frame: frames_read };
                    }
                }
            }
        };

        Ok(ScanReport {
            classes,
            frames_read,
            frames_sampled,
            verdict,
        })
    }
}
