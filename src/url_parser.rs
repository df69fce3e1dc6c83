//! Resolution of Drive and Sheets references (URLs or bare IDs) into IDs.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DriveError, Result};

const FOLDER_MARKER: &str = "folders/";

static FILE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:file|document|spreadsheets|presentation|forms)/d/([a-zA-Z0-9_-]+)")
        .expect("Invalid file URL regex")
});

static OPEN_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&]id=([a-zA-Z0-9_-]+)").expect("Invalid open URL regex")
});

static SPREADSHEET_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("Invalid spreadsheet URL regex")
});

fn is_http_url(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

/// Resolve a folder reference into a folder ID.
///
/// Inputs that do not start with an HTTP(S) scheme are assumed to already be
/// IDs and are returned unchanged. URLs must contain a `folders/` segment;
/// the ID is whatever follows it up to the next `/`, `?` or `#`.
///
/// # Examples
///
/// ```
/// use drive_helper::url_parser::folder_id;
///
/// let id = folder_id("https://drive.google.com/drive/u/0/folders/XYZ").unwrap();
/// assert_eq!(id, "XYZ");
///
/// let id = folder_id("XYZ").unwrap();
/// assert_eq!(id, "XYZ");
/// ```
pub fn folder_id(reference: &str) -> Result<String> {
    if !is_http_url(reference) {
        return Ok(reference.to_string());
    }

    let (_, tail) = reference
        .split_once(FOLDER_MARKER)
        .ok_or_else(|| DriveError::InvalidUrlOrId(reference.to_string()))?;

    let id = tail
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    if id.is_empty() {
        return Err(DriveError::InvalidUrlOrId(reference.to_string()));
    }

    Ok(id.to_string())
}

/// Resolve a file reference into a file ID.
///
/// Accepts `file/d/<ID>` style links (including Docs, Sheets and Slides),
/// `open?id=<ID>` links and folder links. Non-URL input is returned unchanged.
pub fn file_id(reference: &str) -> Result<String> {
    if !is_http_url(reference) {
        return Ok(reference.to_string());
    }

    for regex in [&*FILE_URL_REGEX, &*OPEN_URL_REGEX] {
        if let Some(id) = regex.captures(reference).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    folder_id(reference)
}

/// Resolve a spreadsheet reference into a spreadsheet ID.
///
/// ```
/// use drive_helper::url_parser::spreadsheet_id;
///
/// let id = spreadsheet_id("https://docs.google.com/spreadsheets/d/1Bx/edit#gid=0").unwrap();
/// assert_eq!(id, "1Bx");
/// ```
pub fn spreadsheet_id(reference: &str) -> Result<String> {
    if !is_http_url(reference) {
        return Ok(reference.to_string());
    }

    SPREADSHEET_URL_REGEX
        .captures(reference)
        .and_then(|c| c.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| DriveError::InvalidUrlOrId(reference.to_string()))
}

/// A folder given either as a bare ID or as a Drive URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderReference(String);

impl FolderReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The folder ID this reference points at.
    pub fn resolve(&self) -> Result<String> {
        folder_id(&self.0)
    }
}

impl From<&str> for FolderReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FolderReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for FolderReference {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl fmt::Display for FolderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_id_is_returned_unchanged() {
        assert_eq!(folder_id("1abc123XYZ").unwrap(), "1abc123XYZ");
        assert_eq!(folder_id("  padded ").unwrap(), "  padded ");
        assert_eq!(folder_id("").unwrap(), "");
    }

    #[test]
    fn test_folder_url_with_user() {
        let url = "https://drive.google.com/drive/u/0/folders/XYZ";
        assert_eq!(folder_id(url).unwrap(), "XYZ");
    }

    #[test]
    fn test_folder_url_without_marker_is_an_error() {
        let err = folder_id("https://drive.google.com/drive/my-drive").unwrap_err();
        assert!(matches!(err, DriveError::InvalidUrlOrId(_)));
        assert!(folder_id("https://drive.google.com/drive/folders/").is_err());
    }

    #[test]
    fn test_file_url_variants() {
        assert_eq!(
            file_id("https://drive.google.com/file/d/1abc/view?usp=sharing").unwrap(),
            "1abc"
        );
        assert_eq!(
            file_id("https://docs.google.com/document/d/doc_1/edit").unwrap(),
            "doc_1"
        );
        assert_eq!(
            file_id("https://drive.google.com/open?id=open-1").unwrap(),
            "open-1"
        );
        assert_eq!(
            file_id("https://drive.google.com/drive/folders/fold").unwrap(),
            "fold"
        );
    }

    #[test]
    fn test_folder_reference_resolves() {
        let reference = FolderReference::from("https://drive.google.com/drive/folders/abc?usp=x");
        assert_eq!(reference.resolve().unwrap(), "abc");
        assert_eq!(FolderReference::from("abc").resolve().unwrap(), "abc");
    }
}
