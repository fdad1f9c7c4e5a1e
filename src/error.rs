//! Per-video failure taxonomy.
//!
//! Every task run by the collection walker reports failures through
//! `ProcessError`. None of these abort a batch; the walker records them and
//! moves on to the next video.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ProcessError {
    /// The video could not be opened or has no decodable video track.
    SourceUnreadable {
        path: PathBuf,
        cause: anyhow::Error,
    },
    /// The detector failed on a sampled frame. Partial results are discarded.
    DetectorFailure {
        path: PathBuf,
        frame: u64,
        cause: anyhow::Error,
    },
    /// A rename, move, delete or write failed.
    FilesystemFailure {
        path: PathBuf,
        cause: anyhow::Error,
    },
}

impl ProcessError {
    pub fn unreadable(path: &Path, cause: impl Into<anyhow::Error>) -> Self {
        Self::SourceUnreadable {
            path: path.to_path_buf(),
            cause: cause.into(),
        }
    }

    pub fn detector(path: &Path, frame: u64, cause: impl Into<anyhow::Error>) -> Self {
        Self::DetectorFailure {
            path: path.to_path_buf(),
            frame,
            cause: cause.into(),
        }
    }

    pub fn filesystem(path: &Path, cause: impl Into<anyhow::Error>) -> Self {
        Self::FilesystemFailure {
            path: path.to_path_buf(),
            cause: cause.into(),
        }
    }

    /// Path of the file the failure is attributed to.
    pub fn path(&self) -> &Path {
        match self {
            Self::SourceUnreadable { path, .. }
            | Self::DetectorFailure { path, .. }
            | Self::FilesystemFailure { path, .. } => path,
        }
    }

    /// Short machine-friendly name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } => "source_unreadable",
            Self::DetectorFailure { .. } => "detector_failure",
            Self::FilesystemFailure { .. } => "filesystem_failure",
        }
    }
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnreadable { path, cause } => {
                write!(f, "could not open video {}: {:#}", path.display(), cause)
            }
            Self::DetectorFailure { path, frame, cause } => write!(
                f,
                "detector failed on frame {} of {}: {:#}",
                frame,
                path.display(),
                cause
            ),
            Self::FilesystemFailure { path, cause } => {
                write!(f, "filesystem operation on {} failed: {:#}", path.display(), cause)
            }
        }
    }
}

impl Error for ProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SourceUnreadable { cause, .. }
            | Self::DetectorFailure { cause, .. }
            | Self::FilesystemFailure { cause, .. } => Some(&**cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_names_file_and_cause() {
        let err = ProcessError::detector(Path::new("clips/a.mp4"), 20, anyhow!("cuda oom"));
        let text = err.to_string();
        assert!(text.contains("clips/a.mp4"));
        assert!(text.contains("frame 20"));
        assert!(text.contains("cuda oom"));
        assert_eq!(err.kind(), "detector_failure");
        assert!(err.source().is_some());
    }

    #[test]
    fn io_errors_convert_into_filesystem_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = ProcessError::filesystem(Path::new("b.mov"), io);
        assert_eq!(err.path(), Path::new("b.mov"));
        assert!(err.to_string().contains("read-only"));
    }
}
