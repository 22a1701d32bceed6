// Copyright 2026 The Zeta Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem helpers shared by the object store, refs, and worktree code.

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tempfile::PersistError;
use thiserror::Error;

pub use self::platform::check_symlink_support;
pub use self::platform::try_symlink;

#[derive(Debug, Error)]
#[error("Cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|error| PathError {
            path: path.as_ref().to_path_buf(),
            source: error,
        })
    }
}

/// Creates a directory or does nothing if the directory already exists.
///
/// The function will fail if intermediate directories on the path do not
/// already exist.
pub fn create_or_reuse_dir(dirname: &Path) -> io::Result<()> {
    match fs::create_dir(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Persists the temporary file after synchronizing the content.
///
/// After a system crash, the persisted file should have a valid content if it
/// existed. The persisted file name (or directory entry) could be lost; it's
/// up to the caller to synchronize the directory entries if that matters.
pub fn persist_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
) -> io::Result<File> {
    temp_file.as_file().sync_data()?;
    temp_file
        .persist(new_path)
        .map_err(|PersistError { error, file: _ }| error)
}

/// Like [`persist_temp_file()`], but doesn't try to overwrite the existing
/// target on Windows.
///
/// Content-addressed files are immutable, so a pre-existing target must hold
/// the same bytes and losing the race is not an error.
pub fn persist_content_addressed_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
) -> io::Result<File> {
    temp_file.as_file().sync_data()?;
    if cfg!(windows) {
        // On Windows, overwriting can fail if the target is opened without
        // FILE_SHARE_DELETE. The existing file has the same content anyway.
        match temp_file.persist_noclobber(&new_path) {
            Ok(file) => Ok(file),
            Err(PersistError { error, file: _ }) => {
                if let Ok(existing_file) = File::open(new_path) {
                    Ok(existing_file)
                } else {
                    Err(error)
                }
            }
        }
    } else {
        // On Unix, rename() is atomic and succeeds even if the destination
        // exists. Checking for the target first would be a non-atomic extra
        // step, so don't use persist_noclobber().
        temp_file
            .persist(new_path)
            .map_err(|PersistError { error, file: _ }| error)
    }
}

#[cfg(unix)]
mod platform {
    use std::io;
    use std::os::unix::fs::symlink;
    use std::path::Path;

    /// Symlinks are always available on Unix.
    pub fn check_symlink_support() -> io::Result<bool> {
        Ok(true)
    }

    pub fn try_symlink<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> io::Result<()> {
        symlink(original, link)
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::os::windows::fs::symlink_file;
    use std::path::Path;

    /// Symlinks require elevated privilege or Developer Mode on Windows, so
    /// probe by attempting one in the temp directory.
    pub fn check_symlink_support() -> io::Result<bool> {
        let temp_dir = tempfile::tempdir()?;
        let target = temp_dir.path().join("target");
        let link = temp_dir.path().join("link");
        std::fs::write(&target, b"")?;
        match symlink_file(&target, &link) {
            Ok(()) => Ok(true),
            // 1314: ERROR_PRIVILEGE_NOT_HELD
            Err(err) if err.raw_os_error() == Some(1314) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn try_symlink<P: AsRef<Path>, Q: AsRef<Path>>(original: P, link: Q) -> io::Result<()> {
        // Note: if symlink support is missing the error code will be 1314,
        // ERROR_PRIVILEGE_NOT_HELD; callers degrade to a plain file then.
        symlink_file(original, link)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_persist_content_addressed_races_are_benign() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("object");

        let mut a = NamedTempFile::new_in(temp_dir.path()).unwrap();
        a.write_all(b"same bytes").unwrap();
        persist_content_addressed_temp_file(a, &target).unwrap();

        let mut b = NamedTempFile::new_in(temp_dir.path()).unwrap();
        b.write_all(b"same bytes").unwrap();
        persist_content_addressed_temp_file(b, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"same bytes");
    }
}
