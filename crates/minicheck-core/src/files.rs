//! JavaScript input discovery.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// Input path does not exist.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Directory traversal failed.
    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

fn is_js(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "js")
}

/// Collect `.js` files from the given paths.
///
/// Files are taken as given when they end in `.js`; directories are walked
/// recursively (without following symlinks) in file-name order. Each file is
/// returned once, at its first occurrence. Inputs keep their relative order.
pub fn collect_js_files<P: AsRef<Path>>(paths: &[P]) -> FileResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FileError::NotFound {
                path: path.display().to_string(),
            });
        }

        if path.is_file() {
            if is_js(path) && seen.insert(path.to_path_buf()) {
                files.push(path.to_path_buf());
            }
            continue;
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| FileError::Walk {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file()
                && is_js(entry.path())
                && seen.insert(entry.path().to_path_buf())
            {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join("lib/nested")).expect("mkdir");
        for file in [
            "b.js",
            "a.js",
            "notes.txt",
            "lib/c.js",
            "lib/nested/d.js",
            "lib/style.css",
        ] {
            fs::write(dir.path().join(file), "x;").expect("write");
        }
        dir
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.strip_prefix(root)
                    .expect("under root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn walks_directories_in_sorted_order() {
        let dir = workspace();
        let files = collect_js_files(&[dir.path()]).expect("collects");
        assert_eq!(
            names(dir.path(), &files),
            vec!["a.js", "b.js", "lib/c.js", "lib/nested/d.js"]
        );
    }

    #[test]
    fn explicit_files_keep_argument_order() {
        let dir = workspace();
        let files =
            collect_js_files(&[dir.path().join("b.js"), dir.path().join("a.js")]).expect("ok");
        assert_eq!(names(dir.path(), &files), vec!["b.js", "a.js"]);
    }

    #[test]
    fn non_js_files_are_ignored() {
        let dir = workspace();
        let files = collect_js_files(&[dir.path().join("notes.txt")]).expect("ok");
        assert!(files.is_empty());
    }

    #[test]
    fn duplicates_are_skipped() {
        let dir = workspace();
        let files = collect_js_files(&[dir.path().join("lib/c.js"), dir.path().join("lib")])
            .expect("ok");
        assert_eq!(names(dir.path(), &files), vec!["lib/c.js", "lib/nested/d.js"]);
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = workspace();
        let err = collect_js_files(&[dir.path().join("missing")]).unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
    }
}
