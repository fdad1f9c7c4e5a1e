//! Renames and moves that never overwrite another file.
//!
//! Each operation is a single `rename(2)`, so a concurrent directory listing
//! sees either the old name or the new one.

use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProcessError;

/// Rename `from` to `to`, refusing to replace an existing different file.
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<(), ProcessError> {
    if from == to {
        return Ok(());
    }
    if to.exists() && !same_file(from, to) {
        return Err(ProcessError::filesystem(
            from,
            anyhow!("refusing to overwrite existing {}", to.display()),
        ));
    }
    fs::rename(from, to).map_err(|err| {
        ProcessError::filesystem(
            from,
            anyhow!("failed to rename to {}: {}", to.display(), err),
        )
    })
}

/// Rename `path` within its directory to `new_name`. Returns the new path.
pub fn rename_in_place(path: &Path, new_name: &str) -> Result<PathBuf, ProcessError> {
    let target = path
        .parent()
        .map(|parent| parent.join(new_name))
        .unwrap_or_else(|| PathBuf::from(new_name));
    rename_no_clobber(path, &target)?;
    Ok(target)
}

/// Move `path` into `directory`, keeping its file name.
pub fn move_into(path: &Path, directory: &Path) -> Result<PathBuf, ProcessError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ProcessError::filesystem(path, anyhow!("path has no file name")))?;
    let target = directory.join(file_name);
    rename_no_clobber(path, &target)?;
    Ok(target)
}

/// Append `suffix` to the full file name: `a.mp4` -> `a.mp4.bad`.
pub fn append_to_name(path: &Path, suffix: &str) -> Result<PathBuf, ProcessError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ProcessError::filesystem(path, anyhow!("path has no file name")))?;
    let mut new_name = file_name.to_os_string();
    new_name.push(suffix);
    let target = path.with_file_name(new_name);
    rename_no_clobber(path, &target)?;
    Ok(target)
}

/// Delete files, ignoring ones that are already gone.
pub fn remove_files<'a, I>(paths: I) -> Result<usize, ProcessError>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ProcessError::filesystem(path, err)),
        }
    }
    Ok(removed)
}

pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(path)
        .map_err(|err| anyhow!("failed to create directory {}: {}", path.display(), err))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn renames_within_directory() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("clip.mp4");
        fs::write(&original, b"v").unwrap();

        let renamed = rename_in_place(&original, "clip_Leo.mp4").unwrap();
        assert!(!original.exists());
        assert_eq!(fs::read(&renamed).unwrap(), b"v");
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let err = rename_no_clobber(&a, &b).unwrap_err();
        assert!(matches!(err, ProcessError::FilesystemFailure { .. }));
        assert_eq!(fs::read(&b).unwrap(), b"b");
        assert!(a.exists());
    }

    #[test]
    fn appends_bad_marker_to_full_name() {
        let dir = tempdir().unwrap();
        let clip = dir.path().join("two people.MOV");
        fs::write(&clip, b"v").unwrap();

        let marked = append_to_name(&clip, ".bad").unwrap();
        assert_eq!(marked.file_name().unwrap(), "two people.MOV.bad");
    }

    #[test]
    fn moves_into_subdirectory() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("Person");
        ensure_dir(&sub).unwrap();
        let clip = dir.path().join("x.mkv");
        fs::write(&clip, b"v").unwrap();

        let moved = move_into(&clip, &sub).unwrap();
        assert_eq!(moved, sub.join("x.mkv"));
        assert!(moved.exists());
    }

    #[test]
    fn removing_missing_files_is_not_an_error() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("a.txt");
        fs::write(&present, b"1").unwrap();
        let paths = vec![present.clone(), dir.path().join("gone.txt")];
        assert_eq!(remove_files(&paths).unwrap(), 1);
        assert!(!present.exists());
    }
}
