//! Readiness checking for source files.
//!
//! Before a job is created for a file, we verify the file is not still being
//! written (a copy or download in flight) by sampling its size across a wait
//! window and retrying a bounded number of times until the size holds still.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Default seconds between size samples.
pub const DEFAULT_SAMPLE_WAIT_SECS: u64 = 2;

/// Default number of samples before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Error type for readiness checks
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// File kept changing size across every attempt
    #[error("file never became ready: size still changing after {0} attempts")]
    NeverReady(u32),

    /// IO error reading file metadata
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a single size comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeCheck {
    /// Size unchanged across the window.
    Settled,
    /// Size changed across the window.
    Changing {
        /// Size at the start of the window.
        initial_size: u64,
        /// Size at the end of the window.
        current_size: u64,
    },
}

/// Compare two sampled sizes.
///
/// This is a pure function extracted for property testing.
#[inline]
pub fn compare_sizes(initial_size: u64, current_size: u64) -> SizeCheck {
    if initial_size == current_size {
        SizeCheck::Settled
    } else {
        SizeCheck::Changing {
            initial_size,
            current_size,
        }
    }
}

/// Wait until a file's size stops changing.
///
/// Samples the size, waits `wait_secs`, samples again, and retries up to
/// `max_attempts` comparisons. Returns once a comparison settles.
///
/// # Errors
/// * `ReadinessError::NeverReady` if the size changed on every attempt
/// * `ReadinessError::Io` if the file cannot be read
pub async fn wait_until_ready(
    path: &Path,
    wait_secs: u64,
    max_attempts: u32,
) -> Result<(), ReadinessError> {
    let mut previous = tokio::fs::metadata(path).await?.len();

    for _ in 0..max_attempts {
        sleep(Duration::from_secs(wait_secs)).await;

        let current = tokio::fs::metadata(path).await?.len();
        match compare_sizes(previous, current) {
            SizeCheck::Settled => return Ok(()),
            SizeCheck::Changing { current_size, .. } => previous = current_size,
        }
    }

    Err(ReadinessError::NeverReady(max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    proptest! {
        // Sizes settle exactly when they are equal, and a changing result
        // reports both sampled values.
        #[test]
        fn prop_size_comparison(initial_size: u64, current_size: u64) {
            let result = compare_sizes(initial_size, current_size);

            if initial_size == current_size {
                prop_assert_eq!(result, SizeCheck::Settled);
            } else {
                match result {
                    SizeCheck::Changing { initial_size: i, current_size: c } => {
                        prop_assert_eq!(i, initial_size);
                        prop_assert_eq!(c, current_size);
                    }
                    SizeCheck::Settled => {
                        prop_assert!(false, "Expected Changing when sizes differ");
                    }
                }
            }
        }
    }

    #[test]
    fn test_compare_sizes_settled() {
        assert_eq!(compare_sizes(1000, 1000), SizeCheck::Settled);
    }

    #[test]
    fn test_compare_sizes_changing() {
        assert_eq!(
            compare_sizes(1000, 2000),
            SizeCheck::Changing {
                initial_size: 1000,
                current_size: 2000
            }
        );
    }

    #[tokio::test]
    async fn test_stable_file_is_ready() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("film.mkv");
        fs::write(&path, b"stable contents").unwrap();

        wait_until_ready(&path, 0, 3)
            .await
            .expect("stable file should be ready");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.mkv");

        let result = wait_until_ready(&path, 0, 1).await;
        assert!(matches!(result, Err(ReadinessError::Io(_))));
    }
}
