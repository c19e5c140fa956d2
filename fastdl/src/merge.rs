use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::report::Abandoned;
use crate::retry::{AttemptError, RetryPolicy};

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub moved: Vec<PathBuf>,
    pub retried: Vec<PathBuf>,
    pub abandoned: Vec<Abandoned>,
}

/// Move `source` to `target`, deleting whatever is at `target` first.
///
/// Not atomic: `target` is briefly absent between the delete and the move.
pub fn replace_file(source: &Path, target: &Path) -> io::Result<()> {
    replace_file_with(source, target, |from, to| fs::rename(from, to))
}

/// [`replace_file`] with the rename step swapped out. Falls back to copy and remove when
/// `rename` reports the two paths are on different devices.
fn replace_file_with(
    source: &Path,
    target: &Path,
    rename: impl Fn(&Path, &Path) -> io::Result<()>,
) -> io::Result<()> {
    match fs::remove_file(target) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    match rename(source, target) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
        res => res,
    }
}

/// Move every file below `scratch` to the same relative path below `output`.
pub fn merge_tree(scratch: &Path, output: &Path, policy: &RetryPolicy) -> MergeOutcome {
    merge_tree_with(scratch, output, policy, replace_file)
}

pub(crate) fn merge_tree_with(
    scratch: &Path,
    output: &Path,
    policy: &RetryPolicy,
    mover: impl Fn(&Path, &Path) -> io::Result<()>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for relative in collect_files(scratch) {
        let source = scratch.join(&relative);
        let target = output.join(&relative);
        let result = policy.run(format!("moving {}", source.display()), |_| {
            match fs::symlink_metadata(&source) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(AttemptError::Permanent(io::Error::new(
                        io::ErrorKind::NotFound,
                        "source file vanished",
                    )));
                }
                _ => {}
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(AttemptError::Transient)?;
            }
            mover(&source, &target).map_err(AttemptError::Transient)
        });

        match result {
            Ok(done) => {
                if done.attempts > 1 {
                    outcome.retried.push(relative.clone());
                }
                outcome.moved.push(relative);
            }
            Err(failed) => {
                log::error!(
                    "abandoning {} after {} attempt(s): {}",
                    source.display(),
                    failed.attempts,
                    failed.error
                );
                outcome.abandoned.push(Abandoned {
                    path: relative,
                    reason: failed.error.to_string(),
                });
            }
        }
    }
    outcome
}

/// Every non-directory entry below `dir`, relative to it. Unreadable entries are logged and skipped.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![];
    for entry in WalkDir::new(dir).min_depth(1) {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {}
            Ok(entry) => {
                if let Ok(relative) = entry.path().strip_prefix(dir) {
                    files.push(relative.to_path_buf());
                }
            }
            Err(e) => log::error!("error listing {}: {e}", dir.display()),
        }
    }
    files.sort();
    files
}
