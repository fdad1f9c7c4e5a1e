//! Collection walker.
//!
//! Lists a directory once, filters the entries down to videos and runs a
//! per-file task on each one. A failing (or panicking) task is recorded in the
//! batch summary and the walk moves on; only the initial listing can fail
//! the whole run. The walker itself never mutates the filesystem.

use anyhow::{Context, Result};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::error::ProcessError;

pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mkv", "mov"];

/// Case-insensitive file-extension predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFilter {
    extensions: Vec<String>,
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_EXTENSIONS)
    }
}

impl VideoFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| format!(".{}", ext.as_ref().trim_start_matches('.').to_lowercase()))
                .collect(),
        }
    }

    /// A bare extension such as `.MP4` has no stem and does not match.
    pub fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
    }
}

/// Successful result of a per-file task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing needed to change.
    Unchanged,
    Renamed { to: PathBuf },
    Moved { to: PathBuf },
    /// Image/label pairs written for the video.
    Extracted { frames: usize },
    /// Excluded by the multi-instance guard and marked on disk.
    Rejected { to: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Done { outcome: Outcome },
    Failed { kind: String, message: String },
    Skipped { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub name: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Per-entry record of one walk, in processing order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub directory: PathBuf,
    pub entries: Vec<EntryReport>,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Done { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, EntryStatus::Skipped { .. }))
    }

    pub fn entry(&self, name: &str) -> Option<&EntryReport> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn count(&self, predicate: impl Fn(&EntryStatus) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.status))
            .count()
    }
}

/// Hook for progress reporting.
pub trait WalkObserver {
    /// Called once after listing with the number of matching videos.
    fn started(&mut self, _videos: usize) {}

    /// Called after every entry, videos and skipped entries alike.
    fn entry_done(&mut self, _entry: &EntryReport) {}
}

impl WalkObserver for () {}

pub struct CollectionWalker {
    directory: PathBuf,
}

impl CollectionWalker {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn run<P, F>(&self, is_video: P, per_file: F) -> Result<BatchSummary>
    where
        P: Fn(&str) -> bool,
        F: FnMut(&Path) -> Result<Outcome, ProcessError>,
    {
        self.run_observed(is_video, per_file, &mut ())
    }

    pub fn run_observed<P, F>(
        &self,
        is_video: P,
        mut per_file: F,
        observer: &mut dyn WalkObserver,
    ) -> Result<BatchSummary>
    where
        P: Fn(&str) -> bool,
        F: FnMut(&Path) -> Result<Outcome, ProcessError>,
    {
        let listing = self.list()?;
        let videos = listing
            .iter()
            .filter(|(name, path)| !path.is_dir() && is_video(name.as_str()))
            .count();
        observer.started(videos);

        let mut summary = BatchSummary {
            directory: self.directory.clone(),
            entries: Vec::with_capacity(listing.len()),
        };

        for (name, path) in listing {
            let status = if path.is_dir() {
                log::info!("Skipping directory: {}", name);
                EntryStatus::Skipped {
                    reason: "directory".to_string(),
                }
            } else if !is_video(name.as_str()) {
                log::info!("Skipping non-video file: {}", name);
                EntryStatus::Skipped {
                    reason: "not a video file".to_string(),
                }
            } else {
                log::info!("Processing video: {}", name);
                Self::attempt(&name, &path, &mut per_file)
            };

            let report = EntryReport { name, path, status };
            observer.entry_done(&report);
            summary.entries.push(report);
        }

        log::info!(
            "{}: {} processed, {} failed, {} skipped",
            self.directory.display(),
            summary.processed(),
            summary.failed(),
            summary.skipped()
        );
        Ok(summary)
    }

    fn list(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = std::fs::read_dir(&self.directory)
            .with_context(|| format!("cannot open input directory {}", self.directory.display()))?;
        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to list directory {}", self.directory.display())
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            listing.push((name, entry.path()));
        }
        listing.sort();
        Ok(listing)
    }

    fn attempt<F>(name: &str, path: &Path, per_file: &mut F) -> EntryStatus
    where
        F: FnMut(&Path) -> Result<Outcome, ProcessError>,
    {
        match catch_unwind(AssertUnwindSafe(|| per_file(path))) {
            Ok(Ok(outcome)) => EntryStatus::Done { outcome },
            Ok(Err(err)) => {
                log::error!("Failed processing {}: {}", name, err);
                EntryStatus::Failed {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                }
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("Failed processing {}: task panicked: {}", name, message);
                EntryStatus::Failed {
                    kind: "panic".to_string(),
                    message,
                }
            }
        }
    }
}
