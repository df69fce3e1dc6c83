//! Data models for Google Drive and Google Sheets API payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Fields requested for every file resource.
pub const FILE_FIELDS: &str = "id, name, mimeType, parents, size, webViewLink";

/// A file or folder stored in Google Drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_size", skip_serializing)]
    pub size: Option<u64>,
    #[serde(default, skip_serializing)]
    pub web_view_link: Option<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl std::fmt::Display for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = self
            .size
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        let mime = if self.mime_type.is_empty() {
            "-"
        } else {
            &self.mime_type
        };
        write!(f, "{}\t{}\t{}\t{}", self.id, size_str, mime, self.name)
    }
}

/// Metadata for a file that has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl NewFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            parents: Vec::new(),
        }
    }

    /// A folder named `name` inside `parent_id`.
    pub fn folder(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::new(name, FOLDER_MIME_TYPE).with_parent(parent_id)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parents.push(parent_id.into());
        self
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl FileListResponse {
    /// The continuation token, if another page follows. Drive signals the
    /// last page with either no token or an empty one.
    pub fn continuation(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Credentials and tokens
// ---------------------------------------------------------------------------

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client secret as downloaded from the Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Client secret file wrapper; Google nests the client under `installed` or `web`.
#[derive(Debug, Deserialize)]
pub struct ClientSecrets {
    #[serde(default)]
    pub installed: Option<OAuthClient>,
    #[serde(default)]
    pub web: Option<OAuthClient>,
}

impl ClientSecrets {
    pub fn into_client(self) -> Option<OAuthClient> {
        self.installed.or(self.web)
    }
}

/// User token persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

/// A range of cell values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    pub fn new(range: impl Into<String>, values: Vec<Vec<Value>>) -> Self {
        Self {
            range: Some(range.into()),
            major_dimension: None,
            values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub value_ranges: Vec<ValueRange>,
}

/// How input values are interpreted by the Sheets API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInputOption {
    #[default]
    Raw,
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInputOption::Raw => "RAW",
            ValueInputOption::UserEntered => "USER_ENTERED",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub properties: SpreadsheetProperties,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_columns: u64,
    #[serde(default)]
    pub updated_cells: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateValuesResponse {
    #[serde(default)]
    pub total_updated_rows: u64,
    #[serde(default)]
    pub total_updated_columns: u64,
    #[serde(default)]
    pub total_updated_cells: u64,
    #[serde(default)]
    pub total_updated_sheets: u64,
}

#[derive(Debug, Deserialize)]
pub struct SheetReply {
    pub properties: SheetProperties,
}

/// One reply per request in a spreadsheet batchUpdate.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateReply {
    #[serde(default)]
    pub add_sheet: Option<SheetReply>,
    #[serde(default)]
    pub duplicate_sheet: Option<SheetReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateSpreadsheetResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub replies: Vec<BatchUpdateReply>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_remote_file_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "grades.pdf",
            "mimeType": "application/pdf",
            "parents": ["folder1"],
            "size": "1024"
        }"#;

        let file: RemoteFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "abc123");
        assert_eq!(file.name, "grades.pdf");
        assert_eq!(file.mime_type, "application/pdf");
        assert_eq!(file.parents, vec!["folder1".to_string()]);
        assert_eq!(file.size, Some(1024));
        assert!(!file.is_folder());
    }

    #[test]
    fn test_new_file_serialize() {
        let folder = NewFile::folder("Reports", "root1");
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["name"], "Reports");
        assert_eq!(json["mimeType"], FOLDER_MIME_TYPE);
        assert_eq!(json["parents"][0], "root1");

        let orphan = NewFile::new("notes", "text/plain");
        let json = serde_json::to_value(&orphan).unwrap();
        assert!(json.get("parents").is_none());
    }

    #[test]
    fn test_continuation_treats_empty_token_as_end() {
        let mut page = FileListResponse::default();
        assert_eq!(page.continuation(), None);

        page.next_page_token = Some(String::new());
        assert_eq!(page.continuation(), None);

        page.next_page_token = Some("tok".to_string());
        assert_eq!(page.continuation(), Some("tok"));
    }

    #[test]
    fn test_client_secrets_prefers_installed() {
        let json = r#"{"installed": {"client_id": "id", "client_secret": "secret"}}"#;
        let secrets: ClientSecrets = serde_json::from_str(json).unwrap();
        let client = secrets.into_client().unwrap();
        assert_eq!(client.client_id, "id");
        assert!(client.token_uri.is_none());
    }

    #[test]
    fn test_value_input_option() {
        assert_eq!(ValueInputOption::default().as_str(), "RAW");
        assert_eq!(
            serde_json::to_value(ValueInputOption::UserEntered).unwrap(),
            "USER_ENTERED"
        );
    }
}
