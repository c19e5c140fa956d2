use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::Error;

/// Garry's Mod addon archives
pub const DEFAULT_PATTERN: &str = "*.gma";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Recursively collect every file below `root` whose name matches `pattern`, sorted by path.
pub fn locate_archives(root: &Path, pattern: &Pattern) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::SourceNotADirectory(root.display().to_string()));
    }
    let mut archives = vec![];
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                log::warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_file()
            && pattern.matches_with(&entry.file_name().to_string_lossy(), MATCH_OPTIONS)
        {
            archives.push(entry.into_path());
        }
    }
    archives.sort();
    Ok(archives)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_locate_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.gma"));
        touch(&root.join("nested/deeper/a.gma"));
        touch(&root.join("nested/UPPER.GMA"));
        touch(&root.join("nested/readme.txt"));
        touch(&root.join("not_an_archive.gma.bak"));
        fs::create_dir_all(root.join("dir.gma")).unwrap();

        let pattern = Pattern::new(DEFAULT_PATTERN).unwrap();
        let found = locate_archives(root, &pattern).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("b.gma"),
                root.join("nested/UPPER.GMA"),
                root.join("nested/deeper/a.gma"),
            ]
        );
    }

    #[test]
    fn test_locate_custom_pattern() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.pkg"));
        touch(&dir.path().join("y.gma"));

        let found = locate_archives(dir.path(), &Pattern::new("*.pkg").unwrap()).unwrap();
        assert_eq!(found, vec![dir.path().join("x.pkg")]);
    }

    #[test]
    fn test_locate_empty() {
        let dir = tempfile::tempdir().unwrap();
        let found = locate_archives(dir.path(), &Pattern::new(DEFAULT_PATTERN).unwrap()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_locate_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = locate_archives(&missing, &Pattern::new(DEFAULT_PATTERN).unwrap()).unwrap_err();
        assert!(matches!(err, Error::SourceNotADirectory(_)));

        let file = dir.path().join("file.gma");
        touch(&file);
        let err = locate_archives(&file, &Pattern::new(DEFAULT_PATTERN).unwrap()).unwrap_err();
        assert!(matches!(err, Error::SourceNotADirectory(_)));
    }
}
