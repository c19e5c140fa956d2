use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory under the output root that holds every unit's scratch directory.
pub const SCRATCH_ROOT: &str = ".fastdl-scratch";

pub fn scratch_root(output: &Path) -> PathBuf {
    output.join(SCRATCH_ROOT)
}

/// Scratch directory names for `archives`, one per archive in the same order.
///
/// Names are the archive file stem. Repeated stems get a `~N` suffix so no two units share a
/// directory; comparison ignores case to stay safe on case-insensitive file systems.
pub fn scratch_names(archives: &[PathBuf]) -> Vec<String> {
    let mut used = HashSet::new();
    archives
        .iter()
        .map(|archive| {
            let stem = archive
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "archive".to_owned());
            let mut n = 0;
            loop {
                let name = match n {
                    0 => stem.clone(),
                    n => format!("{stem}~{n}"),
                };
                if used.insert(name.to_lowercase()) {
                    break name;
                }
                n += 1;
            }
        })
        .collect()
}

/// Recursively delete a scratch directory. Already gone counts as success.
pub fn remove_scratch(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

/// Remove the scratch root once every unit is done, leaving it alone if anything survived.
pub fn remove_scratch_root(output: &Path) {
    let root = scratch_root(output);
    match fs::remove_dir(&root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {e}", root.display()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scratch_names_unique() {
        let archives: Vec<PathBuf> = ["a/x.gma", "b/x.gma", "c/X.gma", "y.gma", "d/x~1.gma"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            scratch_names(&archives),
            vec!["x", "x~1", "X~2", "y", "x~1~1"]
        );
    }

    #[test]
    fn test_scratch_name_without_stem() {
        let archives = vec![PathBuf::from(".gma"), PathBuf::from("/")];
        assert_eq!(scratch_names(&archives), vec![".gma", "archive"]);
    }

    #[test]
    fn test_remove_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = scratch_root(dir.path()).join("addon");
        fs::create_dir_all(scratch.join("models")).unwrap();
        fs::write(scratch.join("models/a.mdl"), b"mdl").unwrap();

        remove_scratch(&scratch).unwrap();
        assert!(!scratch.exists());
        // second removal is a no-op
        remove_scratch(&scratch).unwrap();

        remove_scratch_root(dir.path());
        assert!(!scratch_root(dir.path()).exists());
    }

    #[test]
    fn test_scratch_root_kept_when_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = scratch_root(dir.path()).join("stuck");
        fs::create_dir_all(&leftover).unwrap();

        remove_scratch_root(dir.path());
        assert!(leftover.exists());
    }
}
