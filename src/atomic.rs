use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::error::{Result, TallyError};

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Replace the whole content of `path` without ever exposing a half-written file.
///
/// The live file is copied to `<path>.bak`, the new content is serialized into a
/// temp file in the same directory and renamed over the live file. The backup is
/// removed only once the rename has succeeded. If the rename fails the live file
/// is restored from the backup and the backup is left in place.
pub fn atomic_rewrite<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let backup = backup_path(path);
    let had_live = path.exists();

    if had_live {
        fs::copy(path, &backup).map_err(|source| TallyError::PersistNotWritten {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let staged = stage(dir, write);
    let tmp = match staged {
        Ok(tmp) => tmp,
        Err(source) => {
            // live file untouched; the temp file is removed when dropped
            discard(&backup);
            return Err(TallyError::PersistNotWritten {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if let Err(e) = tmp.persist(path) {
        if had_live {
            if let Err(restore) = fs::copy(&backup, path) {
                error!(path = %path.display(), error = %restore, "Backup restore failed");
            }
        }
        return Err(TallyError::PersistRestored {
            path: path.to_path_buf(),
            source: e.error,
        });
    }

    discard(&backup);
    debug!(path = %path.display(), "Rewrote file");
    Ok(())
}

fn stage<F>(dir: &Path, write: F) -> std::io::Result<NamedTempFile>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn discard(backup: &Path) {
    if backup.exists() {
        if let Err(e) = fs::remove_file(backup) {
            warn!(path = %backup.display(), error = %e, "Could not remove backup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_write(out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(b"digest,filename\npartial")?;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "serializer blew up"))
    }

    #[test]
    fn test_rewrite_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.csv");
        atomic_rewrite(&path, |out| out.write_all(b"hello\n")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_rewrite_replaces_content_and_drops_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.csv");
        std::fs::write(&path, "old\n").unwrap();
        atomic_rewrite(&path, |out| out.write_all(b"new\n")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_failure_mid_save_keeps_prior_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.csv");
        let before = b"digest,filename\nabc,Screenshot_1.jpg\n".to_vec();
        std::fs::write(&path, &before).unwrap();

        let err = atomic_rewrite(&path, failing_write).unwrap_err();
        assert!(matches!(err, TallyError::PersistNotWritten { .. }));
        assert!(err.is_retryable());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_failure_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.csv");
        std::fs::write(&path, "keep\n").unwrap();
        let _ = atomic_rewrite(&path, failing_write);
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("pending.csv")]);
    }

    #[test]
    fn test_failure_without_live_file_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.csv");
        assert!(atomic_rewrite(&path, failing_write).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(backup_path(Path::new("/data/pending.csv")), PathBuf::from("/data/pending.csv.bak"));
    }
}
