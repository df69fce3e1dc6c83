//! drive_helper CLI - Google Drive folder helpers and Google Sheets access.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, error};

use drive_helper::config::{self, DEFAULT_CREDENTIALS_PATH, DEFAULT_ENV_FILE, DEFAULT_TOKEN_CACHE_PATH};
use drive_helper::local::expand_patterns;
use drive_helper::models::{ValueInputOption, ValueRange};
use drive_helper::{
    file_id, logging, Config, DriveClient, FolderReference, FolderSync, NewFile, Placement,
    SheetsClient,
};

/// CLI tool for Google Drive folders and Google Sheets.
#[derive(Parser)]
#[command(name = "drive_helper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OAuth client secret or service account JSON file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,

    /// Where the user's OAuth token is cached between runs.
    #[arg(long, env = "GOOGLE_TOKEN_CACHE", default_value = DEFAULT_TOKEN_CACHE_PATH)]
    token_cache: PathBuf,

    /// Use this access token instead of the credentials file.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Env file loaded before reading any other option.
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Drive(DriveCommand),

    /// Google Sheets operations.
    Sheets {
        #[command(subcommand)]
        command: SheetsCommand,
    },
}

#[derive(Subcommand)]
enum DriveCommand {
    /// List every file in a folder.
    List {
        /// Folder URL or ID.
        #[arg(env = "PARENT_FOLDER_URL")]
        folder: String,
    },

    /// Create a folder unless one with the same name already exists.
    Mkdir {
        /// Name of the new folder.
        name: String,

        /// Parent folder URL or ID.
        #[arg(long, short = 'p', env = "PARENT_FOLDER_URL")]
        parent: String,
    },

    /// Create an empty file unless one with the same name and type already exists.
    Create {
        /// Name of the new file.
        name: String,

        /// MIME type, e.g. application/vnd.google-apps.spreadsheet.
        #[arg(long, short = 'm')]
        mime_type: String,

        /// Parent folder URL or ID (repeatable).
        #[arg(long = "parent", short = 'p', required = true)]
        parents: Vec<String>,
    },

    /// Copy a file into a folder unless a duplicate is already there.
    Copy {
        /// File URL or ID.
        file: String,

        /// Destination folder URL or ID.
        #[arg(long, short = 't', env = "OTHER_FOLDER_URL")]
        to: String,
    },

    /// Move a file from one folder to another.
    Move {
        /// File URL or ID.
        file: String,

        /// Current parent folder URL or ID.
        #[arg(long, env = "PARENT_FOLDER_URL")]
        from: String,

        /// New parent folder URL or ID.
        #[arg(long, short = 't', env = "OTHER_FOLDER_URL")]
        to: String,
    },

    /// Upload local files to a folder.
    Upload {
        /// File paths or glob patterns like *.pdf.
        #[arg(required = true, env = "FILE_PATH")]
        patterns: Vec<String>,

        /// Destination folder URL or ID.
        #[arg(long, short = 't', env = "PARENT_FOLDER_URL")]
        to: String,
    },

    /// Download a file into a local directory.
    Download {
        /// File URL or ID.
        file: String,

        /// Local destination directory.
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,

        /// Extension appended to the file name, e.g. pdf.
        #[arg(long, short = 'e')]
        extension: Option<String>,

        /// Export a Google Docs/Sheets/Slides file as this MIME type.
        #[arg(long)]
        export: Option<String>,
    },

    /// Delete files permanently, bypassing the trash.
    Delete {
        /// File URLs or IDs.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Permanently delete everything in the trash.
    EmptyTrash,
}

#[derive(Args)]
struct SpreadsheetArg {
    /// Spreadsheet URL or ID.
    #[arg(long, short = 's', env = "SPREADSHEET_URL")]
    spreadsheet: String,
}

#[derive(Args)]
struct InputArg {
    /// Parse input as if typed into the UI (formulas, dates) instead of raw.
    #[arg(long)]
    user_entered: bool,
}

impl InputArg {
    fn option(&self) -> ValueInputOption {
        if self.user_entered {
            ValueInputOption::UserEntered
        } else {
            ValueInputOption::Raw
        }
    }
}

#[derive(Subcommand)]
enum SheetsCommand {
    /// Print the values of a range, e.g. "Class Data!A2:E".
    Get {
        #[command(flatten)]
        target: SpreadsheetArg,
        range: String,
    },

    /// Print the values of several ranges.
    BatchGet {
        #[command(flatten)]
        target: SpreadsheetArg,
        #[arg(required = true)]
        ranges: Vec<String>,
    },

    /// Create a new spreadsheet.
    Create { title: String },

    /// Add an empty sheet.
    AddSheet {
        #[command(flatten)]
        target: SpreadsheetArg,
        title: String,
    },

    /// Duplicate an existing sheet.
    DuplicateSheet {
        #[command(flatten)]
        target: SpreadsheetArg,
        sheet_id: i64,
        new_name: String,
        /// Position of the new sheet.
        #[arg(long)]
        index: Option<i64>,
    },

    /// Delete a sheet.
    DeleteSheet {
        #[command(flatten)]
        target: SpreadsheetArg,
        sheet_id: i64,
    },

    /// Overwrite a range with a JSON array of rows, e.g. '[["a", 1]]'.
    Update {
        #[command(flatten)]
        target: SpreadsheetArg,
        range: String,
        values: String,
        #[command(flatten)]
        input: InputArg,
    },

    /// Overwrite several ranges from a JSON array of {"range", "values"} objects.
    BatchUpdate {
        #[command(flatten)]
        target: SpreadsheetArg,
        data: String,
        #[command(flatten)]
        input: InputArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // The env file has to be read before clap resolves `env = ...` defaults.
    let env_file = env_file_arg(std::env::args());
    let env_loaded = config::load_env_file(&env_file)
        .with_context(|| format!("Failed to load env file {:?}", env_file))?;

    let cli = Cli::parse();
    logging::init(cli.verbose);
    debug!(env_file = %cli.env_file.display(), env_loaded, "starting");

    let config = Config {
        credentials: cli.credentials,
        token_cache: cli.token_cache,
        access_token: cli.access_token,
    };
    let auth = config
        .authenticator()
        .with_context(|| format!("Failed to load credentials from {:?}", config.credentials))?;

    match cli.command {
        Commands::Drive(command) => run_drive(&DriveClient::new(auth), command).await,
        Commands::Sheets { command } => run_sheets(&SheetsClient::new(auth), command).await,
    }
}

/// Value of `--env-file` on the raw command line, or the default.
fn env_file_arg<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--env-file" {
            if let Some(value) = args.next() {
                return PathBuf::from(value);
            }
        } else if let Some(value) = arg.strip_prefix("--env-file=") {
            return PathBuf::from(value);
        }
    }
    PathBuf::from(DEFAULT_ENV_FILE)
}

fn print_placement(kind: &str, placement: &Placement) {
    match placement {
        Placement::Created(file) => println!("Created {}: {} ({})", kind, file.name, file.id),
        Placement::Existing(file) => {
            println!("{} already exists: {} ({})", kind, file.name, file.id)
        }
    }
}

async fn run_drive(client: &DriveClient, command: DriveCommand) -> Result<()> {
    let sync = FolderSync::new(client);

    match command {
        DriveCommand::List { folder } => {
            let files = sync
                .list_folder(&FolderReference::new(&folder))
                .await
                .with_context(|| format!("Failed to list files in folder: {}", folder))?;

            if files.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
                println!("{}", "-".repeat(100));
                for file in files {
                    println!("{}", file);
                }
            }
        }

        DriveCommand::Mkdir { name, parent } => {
            let placement = sync
                .create_folder(&name, &FolderReference::new(&parent))
                .await
                .with_context(|| format!("Failed to create folder {} in {}", name, parent))?;
            print_placement("folder", &placement);
        }

        DriveCommand::Create {
            name,
            mime_type,
            parents,
        } => {
            let mut file = NewFile::new(&name, mime_type);
            for parent in &parents {
                file = file.with_parent(FolderReference::new(parent).resolve()?);
            }

            let placement = sync
                .create_file(file)
                .await
                .with_context(|| format!("Failed to create file: {}", name))?;
            print_placement("file", &placement);
        }

        DriveCommand::Copy { file, to } => {
            let source = client
                .get_file(&file_id(&file)?)
                .await
                .with_context(|| format!("Failed to look up file: {}", file))?;

            let placement = sync
                .copy_file(&source, &FolderReference::new(&to))
                .await
                .with_context(|| format!("Failed to copy {} to {}", source.name, to))?;
            print_placement("copy", &placement);
        }

        DriveCommand::Move { file, from, to } => {
            let moved = sync
                .move_file(
                    &file_id(&file)?,
                    &FolderReference::new(&from),
                    &FolderReference::new(&to),
                )
                .await
                .with_context(|| format!("Failed to move file: {}", file))?;
            println!("Moved {} ({})", moved.name, moved.id);
        }

        DriveCommand::Upload { patterns, to } => {
            let target = FolderReference::new(&to);
            let files_to_upload = expand_patterns(&patterns)?;

            if files_to_upload.is_empty() {
                anyhow::bail!("No files to upload");
            }

            println!("Uploading {} file(s) to {}...", files_to_upload.len(), to);

            let mut failures = 0;
            for (idx, file_path) in files_to_upload.iter().enumerate() {
                let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
                print!("[{}/{}] Uploading {}... ", idx + 1, files_to_upload.len(), filename);

                match sync.upload_file(file_path, &target).await {
                    Ok(uploaded) => println!("OK ({})", uploaded.id),
                    Err(e) => {
                        println!("FAILED");
                        error!(path = %file_path.display(), error = %e, "upload failed");
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} of {} upload(s) failed", failures, files_to_upload.len());
            }
            println!("Done.");
        }

        DriveCommand::Download {
            file,
            to,
            extension,
            export,
        } => {
            let remote = client
                .get_file(&file_id(&file)?)
                .await
                .with_context(|| format!("Failed to look up file: {}", file))?;

            tokio::fs::create_dir_all(&to)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", to))?;

            print!("Downloading {}... ", remote.name);
            let saved = match export {
                Some(mime_type) => {
                    sync.export_file(&remote, &mime_type, &to, extension.as_deref())
                        .await
                }
                None if remote.mime_type.starts_with("application/vnd.google-apps.") => {
                    println!("FAILED");
                    anyhow::bail!(
                        "{} is a Google-native file ({}); pass --export <mime type>",
                        remote.name,
                        remote.mime_type
                    );
                }
                None => sync.download_file(&remote, &to, extension.as_deref()).await,
            }
            .with_context(|| format!("Failed to download file: {}", remote.id))?;

            println!("OK");
            println!("Saved to: {:?}", saved);
        }

        DriveCommand::Delete { files } => {
            for file in files {
                let id = file_id(&file)?;
                sync.delete_file(&id)
                    .await
                    .with_context(|| format!("Failed to delete file: {}", file))?;
                println!("Deleted {}", id);
            }
        }

        DriveCommand::EmptyTrash => {
            sync.empty_trash().await.context("Failed to empty trash")?;
            println!("Trash emptied.");
        }
    }

    Ok(())
}

fn print_rows(rows: &[Vec<Value>]) {
    if rows.is_empty() {
        println!("No data found.");
        return;
    }
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
}

async fn run_sheets(client: &SheetsClient, command: SheetsCommand) -> Result<()> {
    match command {
        SheetsCommand::Get { target, range } => {
            let values = client
                .get_values(&target.spreadsheet, &range)
                .await
                .with_context(|| format!("Unable to retrieve data from sheet: {}", range))?;
            print_rows(&values.values);
        }

        SheetsCommand::BatchGet { target, ranges } => {
            let response = client
                .batch_get_values(&target.spreadsheet, &ranges)
                .await
                .context("Unable to retrieve data from sheet")?;
            for (idx, value_range) in response.value_ranges.iter().enumerate() {
                println!(
                    "Range {}: {}",
                    idx,
                    value_range.range.as_deref().unwrap_or("-")
                );
                print_rows(&value_range.values);
            }
        }

        SheetsCommand::Create { title } => {
            let spreadsheet = client
                .create_spreadsheet(&title)
                .await
                .with_context(|| format!("Failed to create spreadsheet: {}", title))?;
            println!("Created spreadsheet {}", spreadsheet.spreadsheet_id);
            if let Some(url) = spreadsheet.spreadsheet_url {
                println!("{}", url);
            }
        }

        SheetsCommand::AddSheet { target, title } => {
            let sheet = client
                .add_sheet(&target.spreadsheet, &title)
                .await
                .with_context(|| format!("Failed to add sheet: {}", title))?;
            println!("Added sheet {} ({})", sheet.title, sheet.sheet_id);
        }

        SheetsCommand::DuplicateSheet {
            target,
            sheet_id,
            new_name,
            index,
        } => {
            let sheet = client
                .duplicate_sheet(&target.spreadsheet, sheet_id, &new_name, index)
                .await
                .with_context(|| format!("Failed to duplicate sheet: {}", sheet_id))?;
            println!("Duplicated sheet as {} ({})", sheet.title, sheet.sheet_id);
        }

        SheetsCommand::DeleteSheet { target, sheet_id } => {
            client
                .delete_sheet(&target.spreadsheet, sheet_id)
                .await
                .with_context(|| format!("Failed to delete sheet: {}", sheet_id))?;
            println!("Deleted sheet {}", sheet_id);
        }

        SheetsCommand::Update {
            target,
            range,
            values,
            input,
        } => {
            let rows: Vec<Vec<Value>> =
                serde_json::from_str(&values).context("Values must be a JSON array of rows")?;
            let updated = client
                .update_values(&target.spreadsheet, &range, rows, input.option())
                .await
                .with_context(|| format!("Failed to update range: {}", range))?;
            println!(
                "Updated {} cell(s) in {}",
                updated.updated_cells,
                updated.updated_range.as_deref().unwrap_or(&range)
            );
        }

        SheetsCommand::BatchUpdate {
            target,
            data,
            input,
        } => {
            let data: Vec<ValueRange> = serde_json::from_str(&data)
                .context("Data must be a JSON array of {\"range\", \"values\"} objects")?;
            let updated = client
                .batch_update_values(&target.spreadsheet, data, input.option())
                .await
                .context("Failed to update ranges")?;
            println!(
                "Updated {} cell(s) across {} sheet(s)",
                updated.total_updated_cells, updated.total_updated_sheets
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_env_file_arg() {
        assert_eq!(env_file_arg(args(&["bin", "list"])), PathBuf::from(".env"));
        assert_eq!(
            env_file_arg(args(&["bin", "--env-file", "prod.env", "list"])),
            PathBuf::from("prod.env")
        );
        assert_eq!(
            env_file_arg(args(&["bin", "--env-file=x.env", "list"])),
            PathBuf::from("x.env")
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "drive_helper",
            "--access-token",
            "t",
            "mkdir",
            "Reports",
            "--parent",
            "root",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Drive(DriveCommand::Mkdir { ref name, .. }) if name == "Reports"
        ));

        let cli = Cli::try_parse_from([
            "drive_helper",
            "sheets",
            "get",
            "-s",
            "sheet-id",
            "Class Data!A2:E",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sheets {
                command: SheetsCommand::Get { ref range, .. }
            } if range == "Class Data!A2:E"
        ));
    }

    #[tokio::test]
    async fn test_download_creates_missing_directory() {
        use drive_helper::Authenticator;
        use mockito::{Matcher, Server};

        let mut server = Server::new_async().await;
        let _metadata = server
            .mock("GET", "/files/f1")
            .match_query(Matcher::UrlEncoded(
                "fields".into(),
                drive_helper::models::FILE_FIELDS.into(),
            ))
            .with_body(r#"{"id": "f1", "name": "notes", "mimeType": "text/plain"}"#)
            .create_async()
            .await;
        let _media = server
            .mock("GET", "/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_body("hello")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let to = dir.path().join("nested").join("out");
        let client = DriveClient::new(Authenticator::with_access_token("t"))
            .with_base_urls(server.url(), server.url());

        let command = DriveCommand::Download {
            file: "f1".to_string(),
            to: to.clone(),
            extension: Some("txt".to_string()),
            export: None,
        };
        run_drive(&client, command).await.unwrap();

        assert_eq!(std::fs::read_to_string(to.join("notes.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
