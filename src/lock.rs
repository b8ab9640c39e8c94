//! Advisory whole-file locking for writers.
//!
//! Cross-platform (fs2) exclusive advisory lock on the data file itself,
//! taken when a file is opened for write or append. Readers do not lock.
//!
//! Non-blocking only: a lock held elsewhere surfaces as `SddsError::Lock`.
//! The lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::SddsError;

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // unlock errors on drop are ignored; closing the handle releases it anyway
        let _ = self.file.unlock();
    }
}

/// Exclusively lock `file` (an open handle on `path`). The guard holds a
/// duplicate handle so the caller keeps ownership of the original.
pub fn try_lock_exclusive(file: &File, path: &Path) -> Result<LockGuard> {
    let dup = file
        .try_clone()
        .with_context(|| format!("duplicate handle for lock {}", path.display()))?;
    if let Err(e) = dup.try_lock_exclusive() {
        return Err(anyhow::Error::new(SddsError::Lock(format!(
            "{} is locked by another writer ({})",
            path.display(),
            e
        ))));
    }
    Ok(LockGuard {
        file: dup,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use std::fs::OpenOptions;

    #[test]
    fn second_exclusive_lock_fails() {
        let path = std::env::temp_dir().join(format!(
            "sdds-lock-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let f1 = OpenOptions::new().create(true).write(true).open(&path).unwrap();
        let f2 = OpenOptions::new().write(true).open(&path).unwrap();
        let g = try_lock_exclusive(&f1, &path).unwrap();
        assert_eq!(g.path(), path.as_path());
        let e = try_lock_exclusive(&f2, &path).unwrap_err();
        assert_eq!(error_kind(&e), ErrorKind::Lock);
        drop(g);
        assert!(try_lock_exclusive(&f2, &path).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
