//! Runtime configuration: `.env` loading and credential locations.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};

/// Default location of the OAuth client secret or service account key.
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials/creds.json";

/// Default location of the cached user token.
pub const DEFAULT_TOKEN_CACHE_PATH: &str = "credentials/token.json";

/// Default `.env` file.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Load variables from an env file into the process environment.
///
/// Variables already set in the environment win. Returns `false` when the
/// file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!(path = %path.display(), "loaded env file");
            Ok(true)
        }
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "no env file");
            Ok(false)
        }
        Err(dotenvy::Error::Io(e)) => Err(e.into()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not parse env file");
            Err(DriveError::Config(format!(
                "invalid env file {}: {}",
                path.display(),
                e
            )))
        }
    }
}

/// Where credentials come from.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: PathBuf,
    pub token_cache: PathBuf,
    /// A ready access token; skips every other credential source.
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            token_cache: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
            access_token: None,
        }
    }
}

impl Config {
    /// Build the authenticator this configuration describes.
    pub fn authenticator(&self) -> Result<Authenticator> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Authenticator::with_access_token(token));
        }
        Authenticator::from_file(&self.credentials, self.token_cache.clone())
    }
}
