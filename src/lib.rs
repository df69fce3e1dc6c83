//! drive_helper - Google Drive folder helpers and Google Sheets access.
//!
//! This library provides functionality to:
//! - Resolve folder, file and spreadsheet URLs into IDs
//! - List every entry of a Drive folder across result pages
//! - Create folders/files and copy files with a name + MIME type duplicate guard
//! - Move, upload, download, export and delete Drive files
//! - Read and write spreadsheet values and manage sheets
//!
//! # Example
//!
//! ```no_run
//! use drive_helper::{Authenticator, DriveClient, FolderSync};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("credentials/creds.json", "credentials/token.json")?;
//!     let client = DriveClient::new(auth);
//!     let sync = FolderSync::new(&client);
//!
//!     let parent = "https://drive.google.com/drive/folders/1abc".into();
//!     let folder = sync.create_folder("MyNewFolder", &parent).await?;
//!     println!("Folder ID: {}", folder.file().id);
//!
//!     for file in sync.list_folder(&parent).await? {
//!         println!("{}", file);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod local;
pub mod logging;
pub mod models;
pub mod sheets;
pub mod sync;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::DriveClient;
pub use config::Config;
pub use error::{DriveError, Result};
pub use models::{NewFile, RemoteFile};
pub use sheets::SheetsClient;
pub use sync::{DriveApi, FolderSync, Placement};
pub use url_parser::{file_id, folder_id, spreadsheet_id, FolderReference};
