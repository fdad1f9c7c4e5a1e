//! Per-video tasks run by the collection walker.
//!
//! - `PresenceSorter`: move each video into a "has label" or "lacks label"
//!   subdirectory.
//! - `SuffixTagger`: rename each video to its decorated name.
//! - `SuffixStripper`: rename each video back to its base name.
//! - `FrameExtractor`: write annotated frames for detector retraining,
//!   optionally rejecting videos with several subjects in one frame.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::classify::{ClassificationEngine, NoSink, SampleSink, ScanSettings, Verdict};
use crate::detect::{Detection, Detector};
use crate::error::ProcessError;
use crate::frame::Frame;
use crate::fsops;
use crate::ingest::SourceOpener;
use crate::suffix::{self, SuffixMap};
use crate::walker::Outcome;

/// Marker appended to the file name of rejected videos.
pub const REJECTED_MARKER: &str = ".bad";

pub trait VideoTask {
    fn process(&mut self, path: &Path) -> Result<Outcome, ProcessError>;
}

fn file_name(path: &Path) -> Result<String, ProcessError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| ProcessError::filesystem(path, anyhow!("file name is not valid UTF-8")))
}

// ----------------------------------------------------------------------------
// Presence sorting
// ----------------------------------------------------------------------------

/// Where `PresenceSorter` puts videos.
#[derive(Clone, Debug)]
pub struct PresenceLayout {
    pub label: String,
    pub positive_dir: PathBuf,
    pub negative_dir: PathBuf,
}

impl PresenceLayout {
    /// `<input>/Person` and `<input>/noPerson` style layout under `input_dir`.
    pub fn under(input_dir: &Path, label: &str, positive: &str, negative: &str) -> Self {
        Self {
            label: label.to_string(),
            positive_dir: input_dir.join(positive),
            negative_dir: input_dir.join(negative),
        }
    }
}

pub struct PresenceSorter<D> {
    engine: ClassificationEngine<D>,
    opener: Box<dyn SourceOpener>,
    layout: PresenceLayout,
}

impl<D: Detector> PresenceSorter<D> {
    /// Creates both target directories if they are missing.
    pub fn new(
        detector: D,
        opener: Box<dyn SourceOpener>,
        settings: ScanSettings,
        layout: PresenceLayout,
    ) -> Result<Self> {
        fsops::ensure_dir(&layout.positive_dir)?;
        fsops::ensure_dir(&layout.negative_dir)?;
        let settings = settings.with_targets([layout.label.clone()]);
        Ok(Self {
            engine: ClassificationEngine::new(detector, settings)?,
            opener,
            layout,
        })
    }
}

impl<D: Detector> VideoTask for PresenceSorter<D> {
    fn process(&mut self, path: &Path) -> Result<Outcome, ProcessError> {
        let report = self
            .engine
            .scan_path(self.opener.as_ref(), path, &mut NoSink)?;
        let found = report.contains(&self.layout.label);
        let target_dir = if found {
            log::info!("{}: contains {}", path.display(), self.layout.label);
            &self.layout.positive_dir
        } else {
            log::info!("{}: no {} detected", path.display(), self.layout.label);
            &self.layout.negative_dir
        };
        let to = fsops::move_into(path, target_dir)?;
        log::info!("Moved {} to {}", path.display(), target_dir.display());
        Ok(Outcome::Moved { to })
    }
}

// ----------------------------------------------------------------------------
// Suffix tagging
// ----------------------------------------------------------------------------

pub struct SuffixTagger<D> {
    engine: ClassificationEngine<D>,
    opener: Box<dyn SourceOpener>,
    map: SuffixMap,
}

impl<D: Detector> SuffixTagger<D> {
    pub fn new(
        detector: D,
        opener: Box<dyn SourceOpener>,
        settings: ScanSettings,
        map: SuffixMap,
    ) -> Result<Self> {
        if map.is_empty() {
            return Err(anyhow!("tagging needs at least one label -> suffix mapping"));
        }
        let settings = settings.with_targets(map.labels().map(str::to_string));
        Ok(Self {
            engine: ClassificationEngine::new(detector, settings)?,
            opener,
            map,
        })
    }
}

impl<D: Detector> VideoTask for SuffixTagger<D> {
    /// Scans under the current name and renames once, so a failed scan
    /// leaves the file untouched.
    fn process(&mut self, path: &Path) -> Result<Outcome, ProcessError> {
        let name = file_name(path)?;
        let report = self
            .engine
            .scan_path(self.opener.as_ref(), path, &mut NoSink)?;
        let decorated = suffix::decorated_name(&name, &report.classes, &self.map);
        if decorated == name {
            return Ok(Outcome::Unchanged);
        }
        let to = fsops::rename_in_place(path, &decorated)?;
        log::info!("Renamed {} to {}", name, decorated);
        Ok(Outcome::Renamed { to })
    }
}

// ----------------------------------------------------------------------------
// Suffix stripping
// ----------------------------------------------------------------------------

pub struct SuffixStripper {
    map: SuffixMap,
}

impl SuffixStripper {
    pub fn new(map: SuffixMap) -> Self {
        Self { map }
    }
}

impl VideoTask for SuffixStripper {
    fn process(&mut self, path: &Path) -> Result<Outcome, ProcessError> {
        let name = file_name(path)?;
        let clean = suffix::clean_name(&name, &self.map);
        if clean == name {
            return Ok(Outcome::Unchanged);
        }
        let to = fsops::rename_in_place(path, &clean)?;
        log::info!("Renamed {} to {}", name, clean);
        Ok(Outcome::Renamed { to })
    }
}

// ----------------------------------------------------------------------------
// Frame extraction
// ----------------------------------------------------------------------------

/// Output layout and annotation parameters for `FrameExtractor`.
#[derive(Clone, Debug)]
pub struct ExtractLayout {
    pub output_dir: PathBuf,
    /// Detector label whose boxes are exported.
    pub label: String,
    /// Class number written into the annotation files.
    pub class_number: u32,
    /// Reject videos where one frame holds more than one `label`.
    pub reject_multiple: bool,
}

impl ExtractLayout {
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.output_dir.join("labels")
    }
}

pub struct FrameExtractor<D> {
    engine: ClassificationEngine<D>,
    opener: Box<dyn SourceOpener>,
    layout: ExtractLayout,
}

impl<D: Detector> FrameExtractor<D> {
    /// Creates `images/` and `labels/` under the output directory.
    pub fn new(
        detector: D,
        opener: Box<dyn SourceOpener>,
        settings: ScanSettings,
        layout: ExtractLayout,
    ) -> Result<Self> {
        fsops::ensure_dir(&layout.images_dir())?;
        fsops::ensure_dir(&layout.labels_dir())?;
        let settings = if layout.reject_multiple {
            settings.rejecting_multiple(layout.label.clone())
        } else {
            settings
        };
        Ok(Self {
            engine: ClassificationEngine::new(detector, settings)?,
            opener,
            layout,
        })
    }
}

impl<D: Detector> VideoTask for FrameExtractor<D> {
    fn process(&mut self, path: &Path) -> Result<Outcome, ProcessError> {
        let name = file_name(path)?;
        let (stem, _) = suffix::split_extension(&name);
        let mut writer = AnnotationWriter::new(stem, &self.layout);

        let report = match self.engine.scan_path(self.opener.as_ref(), path, &mut writer) {
            Ok(report) => report,
            Err(err) => {
                writer.discard()?;
                return Err(err);
            }
        };

        if let Verdict::Rejected { frame, count, .. } = &report.verdict {
            log::warn!(
                "{}: {} instances of {} in frame {}, deleting extracted frames and marking video",
                name,
                count,
                self.layout.label,
                frame
            );
            writer.discard()?;
            let to = fsops::append_to_name(path, REJECTED_MARKER)?;
            return Ok(Outcome::Rejected { to });
        }

        log::info!("{}: extracted {} frames", name, writer.frames());
        Ok(Outcome::Extracted {
            frames: writer.frames(),
        })
    }
}

/// Writes `<stem>_frame<N>.jpg` and `<stem>_frame<N>.txt` for every sampled
/// frame containing the extracted label, remembering what it wrote.
struct AnnotationWriter<'a> {
    stem: String,
    layout: &'a ExtractLayout,
    written: Vec<PathBuf>,
    frames: usize,
}

impl<'a> AnnotationWriter<'a> {
    fn new(stem: &str, layout: &'a ExtractLayout) -> Self {
        Self {
            stem: stem.to_string(),
            layout,
            written: Vec::new(),
            frames: 0,
        }
    }

    fn frames(&self) -> usize {
        self.frames
    }

    /// Remove everything written so far.
    fn discard(&mut self) -> Result<(), ProcessError> {
        fsops::remove_files(&self.written)?;
        self.written.clear();
        self.frames = 0;
        Ok(())
    }

    /// Write the annotation file, failing if it already exists.
    fn write_label_file(path: &Path, lines: &[String]) -> Result<()> {
        let mut body = lines.join("\n");
        body.push('\n');
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

impl SampleSink for AnnotationWriter<'_> {
    fn sampled(
        &mut self,
        frame_number: u64,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<(), ProcessError> {
        let lines: Vec<String> = detections
            .iter()
            .filter(|d| d.label == self.layout.label)
            .filter_map(|d| d.bbox)
            .map(|bbox| {
                bbox.normalized(frame.width, frame.height)
                    .annotation_line(self.layout.class_number)
            })
            .collect();
        if lines.is_empty() {
            return Ok(());
        }

        let base = format!("{}_frame{}", self.stem, frame_number);
        let image_path = self.layout.images_dir().join(format!("{}.jpg", base));
        let label_path = self.layout.labels_dir().join(format!("{}.txt", base));

        // Outputs of another video with the same stem are never replaced.
        for existing in [&image_path, &label_path] {
            if existing.exists() {
                return Err(ProcessError::filesystem(
                    existing,
                    anyhow!("refusing to overwrite existing extraction output"),
                ));
            }
        }

        Self::write_label_file(&label_path, &lines)
            .map_err(|cause| ProcessError::filesystem(&label_path, cause))?;
        self.written.push(label_path);
        frame
            .write_jpeg(&image_path)
            .map_err(|cause| ProcessError::filesystem(&image_path, cause))?;
        self.written.push(image_path);
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ScriptedBackend, ScriptedReply};
    use crate::ingest::{FrameSource, SyntheticSource};
    use tempfile::tempdir;

    fn stub_opener(frames: u64) -> Box<dyn SourceOpener> {
        Box::new(move |_: &Path| -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(SyntheticSource::new(frames)))
        })
    }

    fn person_at(x: f32) -> Detection {
        Detection::new("person", 0.95).with_box(BoundingBox::new(x, 8.0, x + 16.0, 40.0))
    }

    #[test]
    fn extractor_writes_image_and_annotation_pairs() {
        let out = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let clip = videos.path().join("garden.mp4");
        fs::write(&clip, b"v").unwrap();

        let detector = ScriptedBackend::new(vec!["person".into()])
            .then_reply(ScriptedReply::Detections(vec![person_at(0.0)]))
            .then_nothing()
            .then_reply(ScriptedReply::Detections(vec![
                person_at(32.0),
                Detection::new("dog", 0.9).with_box(BoundingBox::new(0.0, 0.0, 4.0, 4.0)),
            ]));
        let layout = ExtractLayout {
            output_dir: out.path().to_path_buf(),
            label: "person".into(),
            class_number: 7,
            reject_multiple: true,
        };
        let mut task =
            FrameExtractor::new(detector, stub_opener(3), ScanSettings::new(1, 0.85), layout)
                .unwrap();

        let outcome = task.process(&clip).unwrap();
        assert_eq!(outcome, Outcome::Extracted { frames: 2 });
        assert!(out.path().join("images/garden_frame1.jpg").exists());
        assert!(!out.path().join("images/garden_frame2.jpg").exists());
        let label = fs::read_to_string(out.path().join("labels/garden_frame3.txt")).unwrap();
        assert_eq!(label, "7 0.625000 0.500000 0.250000 0.666667\n");
        assert!(clip.exists());
    }

    #[test]
    fn extractor_rejects_crowded_videos_and_cleans_up() {
        let out = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let clip = videos.path().join("party.mov");
        fs::write(&clip, b"v").unwrap();

        let detector = ScriptedBackend::new(vec!["person".into()])
            .then_reply(ScriptedReply::Detections(vec![person_at(0.0)]))
            .then_reply(ScriptedReply::Detections(vec![person_at(0.0), person_at(40.0)]));
        let layout = ExtractLayout {
            output_dir: out.path().to_path_buf(),
            label: "person".into(),
            class_number: 0,
            reject_multiple: true,
        };
        let mut task =
            FrameExtractor::new(detector, stub_opener(5), ScanSettings::new(1, 0.5), layout)
                .unwrap();

        let outcome = task.process(&clip).unwrap();
        let marked = videos.path().join("party.mov.bad");
        assert_eq!(outcome, Outcome::Rejected { to: marked.clone() });
        assert!(marked.exists());
        assert!(!clip.exists());
        assert_eq!(fs::read_dir(out.path().join("images")).unwrap().count(), 0);
        assert_eq!(fs::read_dir(out.path().join("labels")).unwrap().count(), 0);
    }

    #[test]
    fn extractor_keeps_crowded_frames_when_guard_is_off() {
        let out = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let clip = videos.path().join("party.mov");
        fs::write(&clip, b"v").unwrap();

        let detector = ScriptedBackend::new(vec!["person".into()])
            .then_reply(ScriptedReply::Detections(vec![person_at(0.0), person_at(40.0)]));
        let layout = ExtractLayout {
            output_dir: out.path().to_path_buf(),
            label: "person".into(),
            class_number: 0,
            reject_multiple: false,
        };
        let mut task =
            FrameExtractor::new(detector, stub_opener(1), ScanSettings::new(1, 0.5), layout)
                .unwrap();

        assert_eq!(task.process(&clip).unwrap(), Outcome::Extracted { frames: 1 });
        let label = fs::read_to_string(out.path().join("labels/party_frame1.txt")).unwrap();
        assert_eq!(label.lines().count(), 2);
    }

    #[test]
    fn extractor_discards_partial_output_on_detector_failure() {
        let out = tempdir().unwrap();
        let videos = tempdir().unwrap();
        let clip = videos.path().join("a.mp4");
        fs::write(&clip, b"v").unwrap();

        let detector = ScriptedBackend::new(vec!["person".into()])
            .then_reply(ScriptedReply::Detections(vec![person_at(0.0)]))
            .then_fail("device lost");
        let layout = ExtractLayout {
            output_dir: out.path().to_path_buf(),
            label: "person".into(),
            class_number: 0,
            reject_multiple: true,
        };
        let mut task =
            FrameExtractor::new(detector, stub_opener(4), ScanSettings::new(1, 0.5), layout)
                .unwrap();

        let err = task.process(&clip).unwrap_err();
        assert!(matches!(err, ProcessError::DetectorFailure { frame: 2, .. }));
        assert_eq!(fs::read_dir(out.path().join("images")).unwrap().count(), 0);
        assert!(clip.exists());
    }

    #[test]
    fn stripper_renames_only_decorated_names() {
        let dir = tempdir().unwrap();
        let map = SuffixMap::from_labels(["Vova", "Sha", "Leo"]).unwrap();
        let decorated = dir.path().join("walk_Sha_Leo.mp4");
        let plain = dir.path().join("plain.mp4");
        fs::write(&decorated, b"v").unwrap();
        fs::write(&plain, b"v").unwrap();

        let mut task = SuffixStripper::new(map);
        assert_eq!(
            task.process(&decorated).unwrap(),
            Outcome::Renamed {
                to: dir.path().join("walk.mp4")
            }
        );
        assert_eq!(task.process(&plain).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn tagger_needs_a_non_empty_map() {
        let result = SuffixTagger::new(
            ScriptedBackend::new(Vec::new()),
            stub_opener(1),
            ScanSettings::default(),
            SuffixMap::default(),
        );
        assert!(result.is_err());
    }
}
