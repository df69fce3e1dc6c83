//! Google Drive v3 REST client.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListResponse, NewFile, RemoteFile, FILE_FIELDS};
use crate::sync::DriveApi;

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Files above this size go through a resumable upload session (5 MiB).
const RESUMABLE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Turn a non-2xx response into a [`DriveError::ApiError`].
///
/// Google's JSON error envelope is preferred when the body carries one.
pub(crate) async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}

/// Escape a value for use inside a quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Stream a response body into `destination`, returning the bytes written.
///
/// A partially written file is removed when the transfer fails.
async fn stream_to_file(response: Response, destination: &Path) -> Result<u64> {
    let result = write_body(response, destination).await;
    if result.is_err() {
        match tokio::fs::remove_file(destination).await {
            Ok(()) => debug!(path = %destination.display(), "removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %destination.display(), error = %e, "could not remove partial download"),
        }
    }
    result
}

async fn write_body(response: Response, destination: &Path) -> Result<u64> {
    let mut file = File::create(destination).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Client for the Google Drive REST API.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new DriveClient against the public Google endpoints.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
        }
    }

    /// Point the client at different API and upload endpoints.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch one page of results for a Drive query.
    pub async fn query_page(&self, query: &str, page_token: Option<&str>) -> Result<FileListResponse> {
        let token = self.auth.get_access_token().await?;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);

        let mut request = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", query),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("fields", fields.as_str()),
            ]);

        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let response = check_response(request.send().await?).await?;
        let page: FileListResponse = response.json().await?;
        debug!(query, files = page.files.len(), more = page.continuation().is_some(), "listed page");
        Ok(page)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    async fn upload_multipart(
        &self,
        file: File,
        file_size: u64,
        metadata: &serde_json::Value,
        filename: &str,
        mime_type: &str,
    ) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;
        let file_part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), file_size)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .multipart(form)
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    async fn upload_resumable(
        &self,
        file: File,
        file_size: u64,
        metadata: &serde_json::Value,
        mime_type: &str,
    ) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        // Step 1: open the upload session
        let init_response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", file_size.to_string())
            .json(metadata)
            .send()
            .await?;
        let init_response = check_response(init_response).await?;

        let upload_url = init_response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::ApiError {
                status: init_response.status().as_u16(),
                message: "No upload URL in response".to_string(),
            })?
            .to_string();
        debug!(%upload_url, "resumable session opened");

        // Step 2: stream the file content
        let upload_response = self
            .http
            .put(&upload_url)
            .header("Content-Type", mime_type)
            .header("Content-Length", file_size.to_string())
            .query(&[("fields", FILE_FIELDS)])
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        Ok(check_response(upload_response).await?.json().await?)
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    /// Lists children of `folder_id`. Trashed entries are excluded by the
    /// query, so they never count as duplicates either.
    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListResponse> {
        let query = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        self.query_page(&query, page_token).await
    }

    async fn create(&self, file: &NewFile) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(file)
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    async fn copy(&self, file_id: &str, name: &str, parent_id: &str) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(format!("{}/files/{}/copy", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&serde_json::json!({
                "name": name,
                "parents": [parent_id]
            }))
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    async fn update_parents(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parent: &str,
    ) -> Result<RemoteFile> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .patch(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[
                ("addParents", add_parent),
                ("removeParents", remove_parent),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .json(&serde_json::json!({}))
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    async fn upload(&self, local_path: &Path, parent_id: &str) -> Result<RemoteFile> {
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DriveError::FileNotFound(local_path.display().to_string()))?;

        let file = File::open(local_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DriveError::FileNotFound(local_path.display().to_string()),
            _ => e.into(),
        })?;
        let file_size = file.metadata().await?.len();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let metadata = serde_json::json!({
            "name": filename,
            "parents": [parent_id]
        });

        debug!(filename, file_size, %mime_type, "uploading");
        if file_size > RESUMABLE_THRESHOLD {
            self.upload_resumable(file, file_size, &metadata, &mime_type)
                .await
        } else {
            self.upload_multipart(file, file_size, &metadata, filename, &mime_type)
                .await
        }
    }

    async fn download(&self, file_id: &str, destination: &Path) -> Result<u64> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        stream_to_file(check_response(response).await?, destination).await
    }

    async fn export(&self, file_id: &str, mime_type: &str, destination: &Path) -> Result<u64> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}/export", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("mimeType", mime_type)])
            .send()
            .await?;

        stream_to_file(check_response(response).await?, destination).await
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }

    async fn empty_trash(&self) -> Result<()> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .delete(format!("{}/files/trash", self.api_base))
            .bearer_auth(&token)
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }
}
