use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::coordinator::move_file;
use crate::error::Result;
use crate::hasher::hash_file;
use crate::models::Record;

/// A record whose file is not where the record says it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathIssue {
    /// The file was found elsewhere with a matching digest.
    NeedsRepair {
        digest: String,
        expected: PathBuf,
        found: PathBuf,
    },
    Missing {
        digest: String,
        expected: PathBuf,
    },
}

impl PathIssue {
    pub fn digest(&self) -> &str {
        match self {
            Self::NeedsRepair { digest, .. } | Self::Missing { digest, .. } => digest,
        }
    }

    pub fn expected(&self) -> &Path {
        match self {
            Self::NeedsRepair { expected, .. } | Self::Missing { expected, .. } => expected,
        }
    }
}

/// Look for records whose file is missing and try to find it under any of
/// `roots` by name, confirming the match by digest.
pub fn check_pending(records: &[Record], roots: &[PathBuf]) -> Vec<PathIssue> {
    let missing: Vec<&Record> = records.iter().filter(|r| !r.path.exists()).collect();
    if missing.is_empty() {
        return Vec::new();
    }

    let by_name = index_by_name(roots);
    missing
        .into_iter()
        .map(|r| match locate(r, &by_name) {
            Some(found) => PathIssue::NeedsRepair {
                digest: r.digest.clone(),
                expected: r.path.clone(),
                found,
            },
            None => {
                warn!(digest = %r.digest, path = %r.path.display(), "Record file missing");
                PathIssue::Missing {
                    digest: r.digest.clone(),
                    expected: r.path.clone(),
                }
            }
        })
        .collect()
}

/// Nested or repeated roots list a file once.
fn index_by_name(roots: &[PathBuf]) -> HashMap<String, Vec<PathBuf>> {
    let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for root in roots.iter().filter(|r| r.is_dir()) {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                index.entry(name).or_default().push(entry.into_path());
            }
        }
    }
    for paths in index.values_mut() {
        paths.sort();
        paths.dedup();
    }
    index
}

fn locate(record: &Record, by_name: &HashMap<String, Vec<PathBuf>>) -> Option<PathBuf> {
    let dest_name = record
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let names = std::iter::once(record.filename.clone()).chain(dest_name);
    names
        .filter_map(|name| by_name.get(&name))
        .flatten()
        .find(|candidate| hash_file(candidate).is_ok_and(|d| d == record.digest))
        .cloned()
}

/// Perform the pending move for a `NeedsRepair` issue. Returns whether a file moved.
pub fn repair(issue: &PathIssue) -> Result<bool> {
    match issue {
        PathIssue::NeedsRepair { expected, found, .. } => {
            move_file(found, expected)?;
            info!(from = %found.display(), to = %expected.display(), "Repaired record path");
            Ok(true)
        }
        PathIssue::Missing { .. } => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;

    fn record_for(path: &Path, bytes: &[u8], dir: &Path) -> Record {
        let scratch = dir.join("scratch.bin");
        std::fs::write(&scratch, bytes).unwrap();
        let digest = hash_file(&scratch).unwrap();
        std::fs::remove_file(&scratch).unwrap();
        Record {
            digest,
            filename: "Screenshot_20250914_1.jpg".into(),
            path: path.to_path_buf(),
            date: "14092025".into(),
            amount: "-$12.30".into(),
            merchant: "ALDI".into(),
            category: String::new(),
            description: String::new(),
            status: RecordStatus::Pending,
            completed_at: None,
        }
    }

    #[test]
    fn test_present_files_have_no_issues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Screenshot_20250914_1.jpg");
        std::fs::write(&path, b"bytes").unwrap();
        let r = record_for(&path, b"bytes", dir.path());
        assert!(check_pending(&[r], &[dir.path().to_path_buf()]).is_empty());
    }

    #[test]
    fn test_unmoved_file_needs_repair_and_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        let src = inbox.join("Screenshot_20250914_1.jpg");
        std::fs::write(&src, b"bytes").unwrap();
        let expected = dir.path().join("shots").join("2025-09").join("Screenshot_20250914_1.jpg");
        let r = record_for(&expected, b"bytes", dir.path());

        let roots = [inbox.clone()];
        let issues = check_pending(&[r.clone()], &roots);
        assert_eq!(
            issues,
            vec![PathIssue::NeedsRepair {
                digest: r.digest.clone(),
                expected: expected.clone(),
                found: src.clone(),
            }]
        );
        assert!(repair(&issues[0]).unwrap());
        assert!(expected.exists());
        assert!(!src.exists());
        assert!(check_pending(&[r], &roots).is_empty());
    }

    #[test]
    fn test_same_name_different_bytes_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(inbox.join("Screenshot_20250914_1.jpg"), b"other bytes").unwrap();
        let expected = dir.path().join("shots").join("Screenshot_20250914_1.jpg");
        let r = record_for(&expected, b"bytes", dir.path());

        let issues = check_pending(&[r], &[inbox]);
        assert!(matches!(issues[0], PathIssue::Missing { .. }));
        assert!(!repair(&issues[0]).unwrap());
        assert_eq!(issues[0].expected(), expected.as_path());
    }

    #[test]
    fn test_file_left_in_quarantine_is_found_under_screenshot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        let shots = dir.path().join("shots");
        let quarantine = shots.join(crate::models::QUARANTINE_DIR);
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::create_dir_all(&quarantine).unwrap();
        let stranded = quarantine.join("Screenshot_x.jpg");
        std::fs::write(&stranded, b"bytes").unwrap();
        let expected = shots.join("2025-03").join("Screenshot_x.jpg");
        let r = Record {
            filename: "Screenshot_x.jpg".into(),
            ..record_for(&expected, b"bytes", dir.path())
        };

        assert!(matches!(check_pending(&[r.clone()], &[inbox.clone()])[0], PathIssue::Missing { .. }));

        let roots = [inbox, shots.clone(), shots];
        let issues = check_pending(&[r.clone()], &roots);
        assert_eq!(
            issues,
            vec![PathIssue::NeedsRepair {
                digest: r.digest.clone(),
                expected: expected.clone(),
                found: stranded.clone(),
            }]
        );
        assert_eq!(issues[0].digest(), r.digest);
        assert!(repair(&issues[0]).unwrap());
        assert!(expected.exists());
        assert!(!stranded.exists());
    }
}
