//! Frame sources.
//!
//! A source yields decoded frames of one video in presentation order:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` clips (testing)
//!
//! Opening is separate from reading so that an unreadable video is reported
//! before any frame reaches the detector.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;
use std::path::Path;

use crate::frame::Frame;

pub use file::{SyntheticSource, VideoOpener};

/// Lazy, finite sequence of decoded frames.
pub trait FrameSource {
    /// Next frame, `Ok(None)` at end of stream, or an error when decoding
    /// fails part-way through.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens a frame source for a video path.
pub trait SourceOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

impl<F> SourceOpener for F
where
    F: Fn(&Path) -> Result<Box<dyn FrameSource>>,
{
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        self(path)
    }
}
