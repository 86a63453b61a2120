//! Input discovery and output path planning.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::converter::{OUTPUT_EXTENSION, SUPPORTED_INPUT_EXTENSIONS};

/// Errors that can occur while collecting inputs.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A path named by the caller does not exist.
    #[error("Input not found: {path}")]
    NotFound { path: PathBuf },

    /// A directory named by the caller could not be listed.
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether `path` has a supported video extension (case-insensitive).
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_INPUT_EXTENSIONS.contains(&e.as_str()))
}

/// Expands the given paths into a list of source files.
///
/// Files named directly are kept whatever their extension. Directories
/// contribute their supported video files, sorted by name, descending
/// into subdirectories when `recursive` is set. Duplicates are dropped,
/// keeping the first occurrence.
pub fn collect_inputs<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    recursive: bool,
) -> Result<Vec<PathBuf>, ScanError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    let mut push = |path: PathBuf, inputs: &mut Vec<PathBuf>| {
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            inputs.push(path);
        } else {
            debug!(path = %path.display(), "Skipping duplicate input");
        }
    };

    for path in paths {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(|_| ScanError::NotFound {
            path: path.to_path_buf(),
        })?;

        if meta.is_dir() {
            for file in scan_dir(path, recursive)? {
                push(file, &mut inputs);
            }
        } else {
            push(path.to_path_buf(), &mut inputs);
        }
    }

    Ok(inputs)
}

fn scan_dir(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    let mut found = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir == root => {
                return Err(ScanError::ReadDir { path: dir, source });
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        let mut subdirs = Vec::new();
        for path in paths {
            if path.is_dir() {
                if recursive {
                    subdirs.push(path);
                }
            } else if is_supported_video(&path) {
                found.push(path);
            }
        }
        // Reverse so the stack visits subdirectories in name order
        dirs.extend(subdirs.into_iter().rev());
    }

    Ok(found)
}

/// Where the MP3 for `source` goes: `<dir>/<stem>.mp3`, or next to the
/// source when no directory is given.
pub fn plan_output_path(source: &Path, output_directory: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut file_name = stem;
    file_name.push(".");
    file_name.push(OUTPUT_EXTENSION);

    match output_directory {
        Some(dir) => dir.join(file_name),
        None => source.with_file_name(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_supported_video_extension() {
        assert!(is_supported_video(Path::new("a.mp4")));
        assert!(is_supported_video(Path::new("a.MKV")));
        assert!(!is_supported_video(Path::new("a.mp3")));
        assert!(!is_supported_video(Path::new("README")));
    }

    #[test]
    fn test_collect_directory_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let b = touch(dir.path(), "b.mov");
        let a = touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "nested/c.webm");

        let inputs = collect_inputs([dir.path()], false).unwrap();
        assert_eq!(inputs, vec![a, b]);
    }

    #[test]
    fn test_collect_recursive() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.mp4");
        let c = touch(dir.path(), "nested/c.webm");
        let d = touch(dir.path(), "nested/deeper/d.avi");

        let inputs = collect_inputs([dir.path()], true).unwrap();
        assert_eq!(inputs, vec![a, c, d]);
    }

    #[test]
    fn test_explicit_files_kept_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let odd = touch(dir.path(), "recording.ts");
        let a = touch(dir.path(), "a.mp4");

        let inputs = collect_inputs([odd.clone(), a.clone(), dir.path().to_path_buf()], false).unwrap();
        assert_eq!(inputs, vec![odd, a]);
    }

    #[test]
    fn test_missing_input() {
        let err = collect_inputs(["/definitely/not/here.mp4"], false).unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_plan_output_path() {
        assert_eq!(
            plan_output_path(Path::new("/videos/talk.final.mp4"), Some(Path::new("/music"))),
            PathBuf::from("/music/talk.final.mp3")
        );
        assert_eq!(
            plan_output_path(Path::new("/videos/talk.mp4"), None),
            PathBuf::from("/videos/talk.mp3")
        );
    }
}
