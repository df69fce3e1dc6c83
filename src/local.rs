//! Local file selection for uploads.

use std::path::PathBuf;

use glob::glob;
use tracing::warn;

use crate::error::Result;

/// Expand glob patterns into a sorted, de-duplicated list of regular files.
///
/// A pattern that matches nothing is tried as a literal path before being
/// skipped with a warning.
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let matches: Vec<PathBuf> = glob(pattern)?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();

        if matches.is_empty() {
            let path = PathBuf::from(pattern);
            if path.is_file() {
                files.push(path);
            } else {
                warn!(pattern, "no files matched");
            }
        } else {
            files.extend(matches);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
