//! vidsort
//!
//! Detector-driven housekeeping for a personal video collection.
//!
//! # Architecture
//!
//! Every operation is built from three pieces:
//!
//! 1. **Classification**: a video is decoded frame by frame, every N-th frame
//!    is handed to a `Detector`, and detections above a confidence threshold
//!    are accumulated into a class set. Scanning stops early once all target
//!    labels were seen, and can reject a video outright when one frame holds
//!    several instances of a label.
//! 2. **Naming**: a file name is decorated with one suffix token per detected
//!    class. Stripping all known tokens restores the base name, so tagging the
//!    same video twice yields the same name.
//! 3. **Walking**: a directory is listed once and each video is processed
//!    independently. A failure on one video is recorded and the walk moves on.
//!
//! # Module Structure
//!
//! - `suffix`: suffix maps, stripping and decoration of file names
//! - `frame`: decoded RGB frames and JPEG output
//! - `detect`: `Detector` trait, detections, label vocabularies, backends
//! - `ingest`: frame sources (local files via ffmpeg, synthetic `stub://` clips)
//! - `classify`: the sampling and decision engine
//! - `walker`: directory walk with per-file failure isolation
//! - `tasks`: presence sorting, tagging, stripping, frame extraction
//! - `fsops`: no-clobber renames and moves
//! - `config`, `cli`, `ui`: the `vidsort` binary

pub mod classify;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod fsops;
pub mod ingest;
pub mod suffix;
pub mod tasks;
pub mod ui;
pub mod walker;

pub use classify::{
    ClassificationEngine, MultiInstancePolicy, NoSink, SampleSink, ScanReport, ScanSettings, Verdict,
};
pub use detect::{BoundingBox, Detection, Detector};
pub use error::ProcessError;
pub use frame::Frame;
pub use ingest::{FrameSource, SourceOpener, VideoOpener};
pub use suffix::{ClassSet, SuffixEntry, SuffixMap};
pub use tasks::VideoTask;
pub use walker::{BatchSummary, CollectionWalker, EntryStatus, Outcome, VideoFilter};
