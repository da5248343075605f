//! Source file model and discovery status.
//!
//! A source file is a media file found under a configured search directory.
//! Discovery tracks each file's encoding status, which is derived from the
//! job queue and from what already exists under the destination directory.

use crate::job::EncodingJobStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Encoding status of a discovered source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFileEncodingStatus {
    /// No encoded output exists and no job is queued.
    NotEncoded,
    /// An encoding job exists and has not finished encoding yet.
    InQueue,
    /// Encoded output exists (or the job has reached the encoded state).
    Encoded,
}

impl Default for SourceFileEncodingStatus {
    fn default() -> Self {
        Self::NotEncoded
    }
}

impl std::fmt::Display for SourceFileEncodingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileEncodingStatus::NotEncoded => write!(f, "not_encoded"),
            SourceFileEncodingStatus::InQueue => write!(f, "in_queue"),
            SourceFileEncodingStatus::Encoded => write!(f, "encoded"),
        }
    }
}

/// A media file discovered under a search directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFile {
    /// Unique identifier assigned at discovery time.
    pub id: Uuid,
    /// Full path to the file.
    pub path: PathBuf,
    /// Full path the encoded output will be written to.
    pub destination_path: PathBuf,
    /// Name of the search directory the file was found under.
    pub search_directory: String,
    /// Root of the search directory's source tree.
    pub source_directory: PathBuf,
    /// File belongs to an episode-named directory.
    pub is_episode: bool,
    /// Current encoding status.
    pub status: SourceFileEncodingStatus,
}

impl SourceFile {
    /// File name component of the path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of the file relative to its search directory root.
    ///
    /// Used to rewrite post-processing copy destinations so the copied output
    /// keeps its sub-directory layout.
    pub fn sub_path(&self) -> PathBuf {
        self.path
            .strip_prefix(&self.source_directory)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(self.file_name()))
    }
}

/// Case-folded key under which a path is tracked.
///
/// Discovery and job lookups both compare paths through this key, so a file
/// whose casing differs between observations still resolves to one entry.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Checks whether a file is a valid encoding source.
///
/// Two checks: the extension must be on the allow-list (case-insensitive),
/// and the extension of the file stem must not equal the configured skip
/// extension ("film.skip.mkv" is excluded when the skip extension is "skip").
pub fn is_valid_source_file(path: &Path, extensions: &[String], skip_extension: &str) -> bool {
    let path_lower = path.to_string_lossy().to_lowercase();
    let valid = extensions
        .iter()
        .any(|ext| path_lower.ends_with(&ext.to_lowercase()));

    if !valid || skip_extension.trim().is_empty() {
        return valid;
    }

    let secondary = Path::new(path.file_stem().unwrap_or_default())
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    secondary.is_empty() || !secondary.eq_ignore_ascii_case(skip_extension)
}

/// Translates a job's pipeline status into the source file's encoding status.
///
/// Anything at or past the encoded state counts as encoded; anything earlier
/// means the file is still in the queue.
pub fn translate_job_status(status: EncodingJobStatus) -> SourceFileEncodingStatus {
    if status >= EncodingJobStatus::Encoded {
        SourceFileEncodingStatus::Encoded
    } else {
        SourceFileEncodingStatus::InQueue
    }
}
