//! Folder synchronization helpers: paginated listing, the name + MIME type
//! duplicate guard, and create/copy/move/upload/download orchestration.
//!
//! Everything here goes through [`DriveApi`], so the orchestration can run
//! against [`DriveClient`](crate::client::DriveClient) or any other backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DriveError, Result};
use crate::models::{FileListResponse, NewFile, RemoteFile};
use crate::url_parser::FolderReference;

/// The Drive operations the helpers are built on.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// One page of the non-trashed children of `folder_id`.
    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListResponse>;

    async fn create(&self, file: &NewFile) -> Result<RemoteFile>;

    /// Copy `file_id` into `parent_id` under `name`.
    async fn copy(&self, file_id: &str, name: &str, parent_id: &str) -> Result<RemoteFile>;

    async fn update_parents(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parent: &str,
    ) -> Result<RemoteFile>;

    async fn upload(&self, local_path: &Path, parent_id: &str) -> Result<RemoteFile>;

    /// Write the content of `file_id` to `destination`, returning the byte count.
    async fn download(&self, file_id: &str, destination: &Path) -> Result<u64>;

    /// Like [`DriveApi::download`] for Google-native files, converted to `mime_type`.
    async fn export(&self, file_id: &str, mime_type: &str, destination: &Path) -> Result<u64>;

    /// Delete permanently, skipping the trash.
    async fn delete(&self, file_id: &str) -> Result<()>;

    async fn empty_trash(&self) -> Result<()>;
}

/// Outcome of a guarded create or copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A new remote object was made.
    Created(RemoteFile),
    /// A matching object was already there and was reused.
    Existing(RemoteFile),
}

impl Placement {
    pub fn file(&self) -> &RemoteFile {
        match self {
            Placement::Created(file) | Placement::Existing(file) => file,
        }
    }

    pub fn into_file(self) -> RemoteFile {
        match self {
            Placement::Created(file) | Placement::Existing(file) => file,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Placement::Existing(_))
    }
}

/// First entry whose name and MIME type both equal the candidate's exactly.
pub fn find_duplicate<'a>(entries: &'a [RemoteFile], name: &str, mime_type: &str) -> Option<&'a RemoteFile> {
    entries
        .iter()
        .find(|entry| entry.name == name && entry.mime_type == mime_type)
}

/// Build the local path a download is written to: `dir/name[.extension]`.
///
/// The result is always a direct child of `local_dir`. Path separators in
/// the remote name become `_`, and names that would resolve to `.` or `..`
/// are replaced.
pub fn download_path(local_dir: &Path, name: &str, extension: Option<&str>) -> PathBuf {
    let file_name = match extension.map(|e| e.trim_start_matches('.')).filter(|e| !e.is_empty()) {
        Some(extension) => format!("{}.{}", name, extension),
        None => name.to_string(),
    };
    local_dir.join(local_file_name(&file_name))
}

/// Turn a Drive name (which may contain `/`) into a single path component.
fn local_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "untitled".to_string(),
        _ => cleaned,
    }
}

/// Folder-level operations on top of a [`DriveApi`].
pub struct FolderSync<'a, A: DriveApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: DriveApi + ?Sized> FolderSync<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Every non-trashed entry of a folder, across all pages.
    pub async fn list_folder(&self, folder: &FolderReference) -> Result<Vec<RemoteFile>> {
        let folder_id = folder.resolve()?;
        self.list_folder_id(&folder_id).await
    }

    async fn list_folder_id(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut sent_tokens = HashSet::new();

        loop {
            let page = self.api.list_page(folder_id, page_token.as_deref()).await?;
            let next = page.continuation().map(str::to_string);
            files.extend(page.files);

            match next {
                // A token seen before means the server is cycling.
                Some(next) if !sent_tokens.insert(next.clone()) => {
                    return Err(DriveError::Pagination(format!(
                        "server repeated page token {} for folder {}",
                        next, folder_id
                    )));
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(folder_id, count = files.len(), "listed folder");
        Ok(files)
    }

    /// The entry in `folder` matching `name` and `mime_type`, if any.
    pub async fn find_duplicate(
        &self,
        name: &str,
        mime_type: &str,
        folder: &FolderReference,
    ) -> Result<Option<RemoteFile>> {
        let folder_id = folder.resolve()?;
        self.find_duplicate_in(name, mime_type, &folder_id).await
    }

    async fn find_duplicate_in(
        &self,
        name: &str,
        mime_type: &str,
        folder_id: &str,
    ) -> Result<Option<RemoteFile>> {
        let entries = self.list_folder_id(folder_id).await?;
        Ok(find_duplicate(&entries, name, mime_type).cloned())
    }

    pub async fn is_duplicate(&self, name: &str, mime_type: &str, folder: &FolderReference) -> Result<bool> {
        Ok(self.find_duplicate(name, mime_type, folder).await?.is_some())
    }

    /// Create a folder under `parent` unless one with the same name exists.
    pub async fn create_folder(&self, name: &str, parent: &FolderReference) -> Result<Placement> {
        let parent_id = parent.resolve()?;
        self.create_file(NewFile::folder(name, parent_id)).await
    }

    /// Create `file` unless one of its parents already holds a duplicate.
    pub async fn create_file(&self, file: NewFile) -> Result<Placement> {
        for parent_id in &file.parents {
            if let Some(existing) = self
                .find_duplicate_in(&file.name, &file.mime_type, parent_id)
                .await?
            {
                info!(name = %file.name, parent_id = %parent_id, id = %existing.id, "already exists, reusing");
                return Ok(Placement::Existing(existing));
            }
        }

        let created = self.api.create(&file).await?;
        info!(name = %created.name, id = %created.id, "created");
        Ok(Placement::Created(created))
    }

    /// Copy `file` into `destination` unless a duplicate is already there.
    pub async fn copy_file(&self, file: &RemoteFile, destination: &FolderReference) -> Result<Placement> {
        let destination_id = destination.resolve()?;

        if let Some(existing) = self
            .find_duplicate_in(&file.name, &file.mime_type, &destination_id)
            .await?
        {
            info!(name = %file.name, destination_id = %destination_id, "copy target already exists, reusing");
            return Ok(Placement::Existing(existing));
        }

        let copied = self.api.copy(&file.id, &file.name, &destination_id).await?;
        info!(source = %file.id, id = %copied.id, "copied");
        Ok(Placement::Created(copied))
    }

    /// Move a file between folders. No duplicate check is made.
    pub async fn move_file(
        &self,
        file_id: &str,
        source: &FolderReference,
        target: &FolderReference,
    ) -> Result<RemoteFile> {
        let source_id = source.resolve()?;
        let target_id = target.resolve()?;

        let moved = self.api.update_parents(file_id, &target_id, &source_id).await?;
        info!(file_id, from = %source_id, to = %target_id, "moved");
        Ok(moved)
    }

    /// Upload a local file into `target`. No duplicate check is made.
    pub async fn upload_file(&self, local_path: &Path, target: &FolderReference) -> Result<RemoteFile> {
        let target_id = target.resolve()?;
        let uploaded = self.api.upload(local_path, &target_id).await?;
        info!(path = %local_path.display(), id = %uploaded.id, "uploaded");
        Ok(uploaded)
    }

    /// Download `file` into `local_dir`, named after the remote file with an
    /// optional extension appended. Existing local files are overwritten.
    pub async fn download_file(
        &self,
        file: &RemoteFile,
        local_dir: &Path,
        extension: Option<&str>,
    ) -> Result<PathBuf> {
        let destination = download_path(local_dir, &file.name, extension);
        let bytes = self.api.download(&file.id, &destination).await?;
        info!(id = %file.id, path = %destination.display(), bytes, "downloaded");
        Ok(destination)
    }

    /// Export a Google-native `file` as `mime_type` into `local_dir`.
    pub async fn export_file(
        &self,
        file: &RemoteFile,
        mime_type: &str,
        local_dir: &Path,
        extension: Option<&str>,
    ) -> Result<PathBuf> {
        let destination = download_path(local_dir, &file.name, extension);
        let bytes = self.api.export(&file.id, mime_type, &destination).await?;
        info!(id = %file.id, mime_type, path = %destination.display(), bytes, "exported");
        Ok(destination)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.api.delete(file_id).await?;
        info!(file_id, "deleted permanently");
        Ok(())
    }

    pub async fn empty_trash(&self) -> Result<()> {
        self.api.empty_trash().await?;
        info!("trash emptied");
        Ok(())
    }
}
