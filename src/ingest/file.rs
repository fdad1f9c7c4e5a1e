//! Local file frame source.
//!
//! `VideoOpener` opens local video files. It:
//! - Rejects URL schemes (no network access)
//! - Reports missing or undecodable files before any frame is produced
//! - Decodes frames in-memory to RGB24
//!
//! `stub://<frames>` paths open a synthetic clip instead; append
//! `?fail=<n>` to make decoding fail at frame `n`.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::FrameSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::SourceOpener;
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";
const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;

/// Opener for local video files.
#[derive(Clone, Copy, Debug, Default)]
pub struct VideoOpener;

impl VideoOpener {
    pub fn new() -> Self {
        Self
    }
}

impl SourceOpener for VideoOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let display = path.to_string_lossy();
        if let Some(spec) = display.strip_prefix(STUB_SCHEME) {
            return Ok(Box::new(SyntheticSource::parse(spec)?));
        }
        if display.contains("://") {
            return Err(anyhow!(
                "video ingestion only supports local paths (no URL schemes)"
            ));
        }
        if !path.is_file() {
            return Err(anyhow!("{} is not a readable file", path.display()));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::open(path)?;
            log::debug!("opened {} (ffmpeg)", path.display());
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding {} requires the ingest-file-ffmpeg feature",
                path.display()
            ))
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// Finite synthetic clip.
///
/// Frame `n` (1-based) is a solid colour whose red and green bytes encode
/// `n` little-endian, so tests can tell which frames reached a detector.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    total: u64,
    fail_at: Option<u64>,
    produced: u64,
}

impl SyntheticSource {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            fail_at: None,
            produced: 0,
        }
    }

    /// Fail with a decode error instead of producing frame `frame`.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    fn parse(spec: &str) -> Result<Self> {
        let (count, query) = match spec.split_once('?') {
            Some((count, query)) => (count, Some(query)),
            None => (spec, None),
        };
        let total: u64 = count
            .parse()
            .map_err(|_| anyhow!("stub source needs a frame count, got '{}'", count))?;
        let mut source = Self::new(total);
        if let Some(query) = query {
            let fail_at = query
                .strip_prefix("fail=")
                .and_then(|value| value.parse().ok())
                .ok_or_else(|| anyhow!("unsupported stub option '{}'", query))?;
            source = source.failing_at(fail_at);
        }
        Ok(source)
    }

    /// Recover the 1-based frame number encoded by this source.
    pub fn frame_number(frame: &Frame) -> u64 {
        let pixels = frame.pixels();
        match pixels {
            [r, g, _, ..] => u64::from(*r) | (u64::from(*g) << 8),
            _ => 0,
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.produced
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.produced >= self.total {
            return Ok(None);
        }
        let number = self.produced + 1;
        if self.fail_at == Some(number) {
            return Err(anyhow!("corrupt packet before frame {}", number));
        }
        self.produced = number;
        let rgb = [(number & 0xff) as u8, ((number >> 8) & 0xff) as u8, 0];
        Ok(Some(Frame::solid(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, rgb)))
    }
}
