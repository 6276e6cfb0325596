use crate::core::config::IndexingConfig;
use crate::core::error::{Error, IndexingError, IndexingErrorKind, Result};
use ignore::WalkBuilder;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Represents a discovered file with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
}

/// Files found under a root plus the entries that could not be read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub errors: Vec<IndexingError>,
    /// Symlink loops that were detected and not followed
    pub loops_skipped: usize,
}

/// Discover all indexable files in a directory, in file-name order.
pub fn discover_files(root: &Path, config: &IndexingConfig) -> Result<Discovery> {
    if !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }

    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    // An unreadable root fails the whole pass; below it, errors are per entry.
    if let Err(e) = std::fs::read_dir(root) {
        return Err(match e.kind() {
            ErrorKind::PermissionDenied => Error::PermissionDenied(root.to_path_buf()),
            _ => Error::Io(e),
        });
    }

    let mut discovery = Discovery::default();

    let walker = WalkBuilder::new(root)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .git_global(false)
        .ignore(config.respect_gitignore)
        .parents(config.respect_gitignore)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for result in walker {
        match result {
            Ok(entry) => {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if !is_file || !is_indexable(entry.path(), &config.extensions) {
                    continue;
                }

                let path = entry.path();
                let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();
                discovery.files.push(DiscoveredFile {
                    path: path.to_path_buf(),
                    relative_path,
                });
            }
            Err(err) if is_loop(&err) => {
                debug!("Skipping symlink loop: {}", err);
                discovery.loops_skipped += 1;
            }
            Err(err) => {
                warn!("Failed to access entry: {}", err);
                let path = error_path(&err).unwrap_or_else(|| root.to_path_buf());
                let indexing_error = match err.io_error() {
                    Some(io) => IndexingError::from_io(path, io),
                    None => IndexingError::new(path, IndexingErrorKind::Io, err.to_string()),
                };
                discovery.errors.push(indexing_error);
            }
        }
    }

    Ok(discovery)
}

/// Check if a file has one of the configured extensions. An empty list
/// accepts everything.
pub fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

fn is_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_loop(err),
        ignore::Error::Partial(errs) => errs.iter().any(is_loop),
        _ => false,
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn txt_and_md() -> IndexingConfig {
        IndexingConfig {
            extensions: vec!["txt".to_string(), "md".to_string()],
            ..IndexingConfig::default()
        }
    }

    #[test]
    fn test_is_indexable() {
        let exts = vec!["txt".to_string()];
        assert!(is_indexable(Path::new("test.txt"), &exts));
        assert!(is_indexable(Path::new("test.TXT"), &exts));
        assert!(!is_indexable(Path::new("test"), &exts));
        assert!(!is_indexable(Path::new("test.md"), &exts));
        assert!(is_indexable(Path::new("test.bin"), &[]));
    }

    #[test]
    fn test_discover_files_basic() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("docs");
        fs::create_dir_all(&test_dir).unwrap();

        fs::write(test_dir.join("b.txt"), "two").unwrap();
        fs::write(test_dir.join("a.txt"), "one").unwrap();
        fs::write(test_dir.join("c.md"), "three").unwrap();
        fs::write(test_dir.join("d.rs"), "fn main() {}").unwrap();

        let found = discover_files(&test_dir, &txt_and_md()).unwrap();
        let names: Vec<String> = found
            .files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.md"]);
        assert!(found.errors.is_empty());
    }

    #[test]
    fn test_discover_files_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("docs");
        let subdir = test_dir.join("subdir");
        fs::create_dir_all(&subdir).unwrap();

        fs::write(test_dir.join("root.txt"), "x").unwrap();
        fs::write(subdir.join("nested.txt"), "y").unwrap();

        let found = discover_files(&test_dir, &IndexingConfig::default()).unwrap();
        assert_eq!(found.files.len(), 2);
        assert!(found
            .files
            .iter()
            .any(|f| f.relative_path == Path::new("subdir").join("nested.txt")));
    }

    #[test]
    fn test_discover_files_respects_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("docs");
        fs::create_dir_all(test_dir.join("skip")).unwrap();
        fs::write(test_dir.join(".ignore"), "skip/\n").unwrap();
        fs::write(test_dir.join("keep.txt"), "x").unwrap();
        fs::write(test_dir.join("skip").join("gone.txt"), "y").unwrap();

        let found = discover_files(&test_dir, &IndexingConfig::default()).unwrap();
        assert_eq!(found.files.len(), 1);

        let config = IndexingConfig {
            respect_gitignore: false,
            ..IndexingConfig::default()
        };
        let found = discover_files(&test_dir, &config).unwrap();
        assert_eq!(found.files.len(), 2);
    }

    #[test]
    fn test_discover_files_nonexistent_directory() {
        let result = discover_files(
            Path::new("/nonexistent/directory"),
            &IndexingConfig::default(),
        );
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_discover_files_file_instead_of_directory() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("file.txt");
        fs::write(&test_file, "content").unwrap();

        let result = discover_files(&test_file, &IndexingConfig::default());
        assert!(matches!(result, Err(Error::NotADirectory(_))));
    }

    #[test]
    fn test_discover_files_includes_hidden_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("docs");
        fs::create_dir_all(test_dir.join(".notes")).unwrap();
        fs::write(test_dir.join("visible.txt"), "x").unwrap();
        fs::write(test_dir.join(".notes").join("hidden.txt"), "y").unwrap();
        fs::write(test_dir.join(".draft.txt"), "z").unwrap();

        let found = discover_files(&test_dir, &IndexingConfig::default()).unwrap();
        assert_eq!(found.files.len(), 3);

        let config = IndexingConfig {
            include_hidden: false,
            ..IndexingConfig::default()
        };
        let found = discover_files(&test_dir, &config).unwrap();
        assert_eq!(found.files.len(), 1);
        assert_eq!(found.files[0].relative_path, Path::new("visible.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_files_unreadable_root() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("a.txt"), "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read the directory anyway.
        let readable = fs::read_dir(&locked).is_ok();
        let result = discover_files(&locked, &IndexingConfig::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result, Err(Error::PermissionDenied(p)) if p == locked));
        }
    }

    #[test]
    fn test_discover_files_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let found = discover_files(temp_dir.path(), &IndexingConfig::default()).unwrap();
        assert!(found.files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_files_symlink_cycle_terminates() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("docs");
        let inner = test_dir.join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("a.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&test_dir, inner.join("back")).unwrap();

        let found = discover_files(&test_dir, &IndexingConfig::default()).unwrap();
        assert_eq!(found.files.len(), 1);
        assert_eq!(found.loops_skipped, 1);
    }
}
