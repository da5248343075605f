//! Scanner module for enumerating source files in search directories.
//!
//! This module walks one search directory at a time: it collects every valid
//! source file under the source root and the set of file stems present under
//! the destination root. Status derivation and diffing happen in discovery;
//! the scan itself is pure filesystem work and runs on blocking threads.

use crate::source_file::is_valid_source_file;
use encoda_config::SearchDirectoryConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A source file candidate found during a directory scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCandidate {
    /// Full path to the source file.
    pub path: PathBuf,
    /// Full path the encoded output would be written to.
    pub destination_path: PathBuf,
    /// A file with the same stem exists under the destination root.
    pub destination_exists: bool,
}

/// Result of scanning one search directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScan {
    /// Candidates found under the source root, unordered.
    pub candidates: Vec<ScanCandidate>,
}

/// Scan a single search directory.
///
/// Walks the source root recursively, keeping files that pass the validity
/// check, and maps each to its destination path by re-rooting under the
/// destination directory. Hidden directories are skipped. A missing source
/// root yields an empty scan.
pub fn scan_directory(
    directory: &SearchDirectoryConfig,
    extensions: &[String],
    skip_extension: &str,
) -> DirectoryScan {
    if !directory.source.exists() {
        return DirectoryScan::default();
    }

    let destination_stems = collect_destination_stems(&directory.destination, extensions);

    let mut candidates = Vec::new();
    for entry in walk_visible(&directory.source) {
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }
        if !is_valid_source_file(path, extensions, skip_extension) {
            continue;
        }

        let destination_path = match path.strip_prefix(&directory.source) {
            Ok(sub) => directory.destination.join(sub),
            Err(_) => continue,
        };
        let destination_exists = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|stem| destination_stems.contains(&stem.to_lowercase()))
            .unwrap_or(false);

        candidates.push(ScanCandidate {
            path: path.to_path_buf(),
            destination_path,
            destination_exists,
        });
    }

    DirectoryScan { candidates }
}

/// Collect lowercase file stems of media files under the destination root.
fn collect_destination_stems(destination: &Path, extensions: &[String]) -> HashSet<String> {
    if !destination.exists() {
        return HashSet::new();
    }

    walk_visible(destination)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let lower = entry.path().to_string_lossy().to_lowercase();
            extensions.iter().any(|ext| lower.ends_with(&ext.to_lowercase()))
        })
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase())
        })
        .collect()
}

/// Recursive walk that skips hidden directories below the root.
fn walk_visible(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() && entry.depth() > 0 {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with('.') {
                        return false;
                    }
                }
            }
            true
        })
        .filter_map(|e| e.ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn default_extensions() -> Vec<String> {
        vec![".mkv".to_string(), ".m4v".to_string(), ".avi".to_string()]
    }

    fn make_directory(source: &Path, destination: &Path) -> SearchDirectoryConfig {
        SearchDirectoryConfig {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            automated: false,
            episode_naming: false,
            post_processing: None,
        }
    }

    #[test]
    fn test_scan_missing_source_is_empty() {
        let temp = TempDir::new().unwrap();
        let dir = make_directory(&temp.path().join("absent"), &temp.path().join("dest"));

        let scan = scan_directory(&dir, &default_extensions(), "skip");
        assert!(scan.candidates.is_empty());
    }

    #[test]
    fn test_scan_finds_valid_files_and_maps_destination() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let dest = temp.path().join("dest");
        fs::create_dir_all(source.join("sci-fi")).unwrap();
        fs::create_dir_all(&dest).unwrap();

        File::create(source.join("film.mkv")).unwrap();
        File::create(source.join("sci-fi/other.m4v")).unwrap();
        File::create(source.join("notes.txt")).unwrap();
        File::create(source.join("raw.skip.mkv")).unwrap();

        let dir = make_directory(&source, &dest);
        let mut scan = scan_directory(&dir, &default_extensions(), "skip");
        scan.candidates.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(scan.candidates.len(), 2);
        assert_eq!(scan.candidates[0].path, source.join("film.mkv"));
        assert_eq!(scan.candidates[0].destination_path, dest.join("film.mkv"));
        assert_eq!(
            scan.candidates[1].destination_path,
            dest.join("sci-fi/other.m4v")
        );
    }

    #[test]
    fn test_scan_marks_existing_destination_stems() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();

        File::create(source.join("encoded.mkv")).unwrap();
        File::create(source.join("fresh.mkv")).unwrap();
        // Destination holds the already-encoded output, stem match is
        // case-insensitive and extension-independent
        File::create(dest.join("Encoded.m4v")).unwrap();

        let dir = make_directory(&source, &dest);
        let scan = scan_directory(&dir, &default_extensions(), "skip");

        let encoded = scan
            .candidates
            .iter()
            .find(|c| c.path == source.join("encoded.mkv"))
            .expect("encoded.mkv found");
        assert!(encoded.destination_exists);

        let fresh = scan
            .candidates
            .iter()
            .find(|c| c.path == source.join("fresh.mkv"))
            .expect("fresh.mkv found");
        assert!(!fresh.destination_exists);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        // Files under hidden directories never appear in scan results.
        #[test]
        fn prop_hidden_directory_exclusion(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("source");
            let dest = temp.path().join("dest");

            let visible_path = source.join(&visible_dir);
            fs::create_dir_all(&visible_path).unwrap();
            let visible_video = visible_path.join(format!("{}.mkv", filename));
            File::create(&visible_video).unwrap();

            let hidden_path = source.join(&hidden_dir);
            fs::create_dir_all(&hidden_path).unwrap();
            let hidden_video = hidden_path.join(format!("{}.mkv", filename));
            File::create(&hidden_video).unwrap();

            let dir = make_directory(&source, &dest);
            let scan = scan_directory(&dir, &default_extensions(), "skip");

            prop_assert!(
                scan.candidates.iter().any(|c| c.path == visible_video),
                "video in visible directory should be found: {:?}",
                visible_video
            );
            prop_assert!(
                !scan.candidates.iter().any(|c| c.path == hidden_video),
                "video in hidden directory should NOT be found: {:?}",
                hidden_video
            );
        }

        // Scanning twice with no filesystem change yields identical candidates.
        #[test]
        fn prop_scan_is_idempotent(
            names in prop::collection::hash_set("[a-z0-9]{1,12}", 1..8),
        ) {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("source");
            let dest = temp.path().join("dest");
            fs::create_dir_all(&source).unwrap();

            for name in &names {
                File::create(source.join(format!("{}.mkv", name))).unwrap();
            }

            let dir = make_directory(&source, &dest);
            let mut first = scan_directory(&dir, &default_extensions(), "skip");
            let mut second = scan_directory(&dir, &default_extensions(), "skip");
            first.candidates.sort_by(|a, b| a.path.cmp(&b.path));
            second.candidates.sort_by(|a, b| a.path.cmp(&b.path));

            prop_assert_eq!(first.candidates.len(), names.len());
            prop_assert_eq!(first.candidates, second.candidates);
        }
    }
}
