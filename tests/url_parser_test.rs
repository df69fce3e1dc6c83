//! Tests for folder, file and spreadsheet reference resolution.

use drive_helper::url_parser::{file_id, folder_id, spreadsheet_id, FolderReference};
use drive_helper::DriveError;

mod resolve_folder_url {
    use super::*;

    #[test]
    fn basic_folder_url() {
        let url = "https://drive.google.com/drive/folders/1abc123XYZ-_def456";
        assert_eq!(folder_id(url).unwrap(), "1abc123XYZ-_def456");
    }

    #[test]
    fn folder_url_with_user_0() {
        let url = "https://drive.google.com/drive/u/0/folders/XYZ";
        assert_eq!(folder_id(url).unwrap(), "XYZ");
    }

    #[test]
    fn folder_url_http() {
        let url = "http://drive.google.com/drive/folders/1abc123XYZ";
        assert_eq!(folder_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn folder_url_with_query_params() {
        let url = "https://drive.google.com/drive/folders/1abc123XYZ?usp=sharing";
        assert_eq!(folder_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn folder_url_with_trailing_slash_or_fragment() {
        assert_eq!(
            folder_id("https://drive.google.com/drive/folders/abc/").unwrap(),
            "abc"
        );
        assert_eq!(
            folder_id("https://drive.google.com/drive/folders/abc#top").unwrap(),
            "abc"
        );
    }
}

mod bare_ids {
    use super::*;

    #[test]
    fn returned_unchanged() {
        for id in ["1abc123XYZ", "abc_123-XYZ", "has space", "  padded  ", "root"] {
            assert_eq!(folder_id(id).unwrap(), id);
            assert_eq!(file_id(id).unwrap(), id);
            assert_eq!(spreadsheet_id(id).unwrap(), id);
        }
    }

    #[test]
    fn other_schemes_are_not_urls() {
        assert_eq!(folder_id("ftp://host/folders/x").unwrap(), "ftp://host/folders/x");
        assert_eq!(folder_id("httpsfolders/x").unwrap(), "httpsfolders/x");
    }
}

mod invalid_inputs {
    use super::*;

    #[test]
    fn url_without_folder_marker() {
        let err = folder_id("https://example.com/folder/123").unwrap_err();
        assert!(matches!(err, DriveError::InvalidUrlOrId(ref s) if s == "https://example.com/folder/123"));
    }

    #[test]
    fn url_with_empty_id() {
        assert!(folder_id("https://drive.google.com/drive/folders/").is_err());
        assert!(folder_id("https://drive.google.com/drive/folders/?usp=sharing").is_err());
    }

    #[test]
    fn spreadsheet_url_without_id() {
        assert!(spreadsheet_id("https://docs.google.com/spreadsheets/").is_err());
    }

    #[test]
    fn file_url_without_any_id() {
        assert!(file_id("https://drive.google.com/drive/my-drive").is_err());
    }
}

mod resolve_file_url {
    use super::*;

    #[test]
    fn file_url_with_view() {
        let url = "https://drive.google.com/file/d/1abc123XYZ/view";
        assert_eq!(file_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn google_native_urls() {
        assert_eq!(
            file_id("https://docs.google.com/spreadsheets/d/sheet1/edit#gid=0").unwrap(),
            "sheet1"
        );
        assert_eq!(
            file_id("https://docs.google.com/presentation/d/deck_1/edit").unwrap(),
            "deck_1"
        );
    }

    #[test]
    fn open_url() {
        let url = "https://drive.google.com/open?id=1abc123XYZ";
        assert_eq!(file_id(url).unwrap(), "1abc123XYZ");
    }
}

mod resolve_spreadsheet_url {
    use super::*;

    #[test]
    fn edit_url() {
        let url = "https://docs.google.com/spreadsheets/d/1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms/edit";
        assert_eq!(
            spreadsheet_id(url).unwrap(),
            "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms"
        );
    }

    #[test]
    fn url_without_suffix() {
        let url = "https://docs.google.com/spreadsheets/d/abc";
        assert_eq!(spreadsheet_id(url).unwrap(), "abc");
    }
}

mod folder_reference {
    use super::*;

    #[test]
    fn display_keeps_original_text() {
        let url = "https://drive.google.com/drive/folders/abc";
        let reference = FolderReference::from(url);
        assert_eq!(reference.to_string(), url);
        assert_eq!(reference.as_str(), url);
        assert_eq!(reference.resolve().unwrap(), "abc");
    }

    #[test]
    fn from_owned_string() {
        let reference = FolderReference::from(String::from("xyz"));
        assert_eq!(reference.resolve().unwrap(), "xyz");
    }
}
