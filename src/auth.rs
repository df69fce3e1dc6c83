//! Authentication for Google APIs.
//!
//! Three token sources are supported:
//! - service account credentials, exchanged through a signed JWT,
//! - an OAuth client secret plus a cached user token on disk, refreshed when
//!   it expires and obtained through a one-time console prompt otherwise,
//! - a fixed access token.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{DriveError, Result};
use crate::models::{ClientSecrets, OAuthClient, ServiceAccountCredentials, StoredToken, TokenResponse};

/// Google OAuth2 token endpoint.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 consent endpoint.
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google Drive API scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Google Sheets API scope.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // Space separated OAuth scopes
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > SystemTime::now() + EXPIRY_BUFFER
    }
}

enum TokenSource {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser {
        client: OAuthClient,
        token_cache: PathBuf,
    },
    Static(String),
}

/// Authenticator for Google APIs. Clones share the same token cache.
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<TokenSource>,
    scopes: Arc<Vec<String>>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn default_scopes() -> Vec<String> {
    vec![DRIVE_SCOPE.to_string(), SPREADSHEETS_SCOPE.to_string()]
}

impl Authenticator {
    fn with_source(source: TokenSource) -> Self {
        Self {
            source: Arc::new(source),
            scopes: Arc::new(default_scopes()),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Create an authenticator from a credentials file, detecting its kind.
    ///
    /// Service account keys are used directly. OAuth client secret files
    /// (`installed` or `web`) use `token_cache` to persist the user token.
    pub fn from_file<P: AsRef<Path>>(path: P, token_cache: impl Into<PathBuf>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&content)?;

        if value.get("private_key").is_some() {
            let credentials: ServiceAccountCredentials = serde_json::from_value(value)?;
            return Ok(Self::new(credentials));
        }

        let secrets: ClientSecrets = serde_json::from_value(value)?;
        let client = secrets.into_client().ok_or_else(|| {
            DriveError::AuthenticationError(format!(
                "{} is neither a service account key nor an OAuth client secret",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::authorized_user(client, token_cache))
    }

    /// Create a new authenticator from a service account JSON file.
    pub fn from_service_account_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    /// Create a new authenticator from service account credentials.
    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self::with_source(TokenSource::ServiceAccount(credentials))
    }

    /// Create an authenticator acting on behalf of a user.
    pub fn authorized_user(client: OAuthClient, token_cache: impl Into<PathBuf>) -> Self {
        Self::with_source(TokenSource::AuthorizedUser {
            client,
            token_cache: token_cache.into(),
        })
    }

    /// Create an authenticator that always hands out `access_token`.
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(access_token.into()))
    }

    /// Replace the requested OAuth scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Arc::new(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        if let TokenSource::Static(token) = self.source.as_ref() {
            return Ok(token.clone());
        }

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.access_token.clone());
            }
        }

        let new_token = match self.source.as_ref() {
            TokenSource::ServiceAccount(credentials) => {
                self.service_account_token(credentials).await?
            }
            TokenSource::AuthorizedUser {
                client,
                token_cache,
            } => self.user_token(client, token_cache).await?,
            TokenSource::Static(token) => return Ok(token.clone()),
        };

        let mut cached = self.cached_token.write().await;
        *cached = Some(new_token.clone());

        Ok(new_token.access_token)
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<CachedToken> {
        let now = now_secs();
        let token_uri = credentials.token_uri.as_deref().unwrap_or(TOKEN_URI);

        let claims = Claims {
            iss: credentials.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        debug!(client_email = %credentials.client_email, "exchanging service account assertion");
        let response = self
            .request_token(
                token_uri,
                &[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                    ("assertion", &jwt),
                ],
            )
            .await?;

        Ok(CachedToken {
            access_token: response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(response.expires_in),
        })
    }

    /// Produce a user token from the on-disk cache, refreshing or prompting
    /// as needed. Any new token is written back to `token_cache`.
    async fn user_token(&self, client: &OAuthClient, token_cache: &Path) -> Result<CachedToken> {
        let stored = match load_token(token_cache)? {
            Some(stored) if stored.expires_at.is_some_and(|t| t > now_secs() + EXPIRY_BUFFER.as_secs()) => {
                debug!(path = %token_cache.display(), "using cached user token");
                stored
            }
            Some(StoredToken {
                refresh_token: Some(refresh_token),
                ..
            }) => {
                info!("refreshing expired user token");
                let refreshed = self.refresh_user_token(client, &refresh_token).await?;
                save_token(token_cache, &refreshed)?;
                refreshed
            }
            _ => {
                let fresh = self.authorize_from_console(client).await?;
                save_token(token_cache, &fresh)?;
                fresh
            }
        };

        let expires_at = stored
            .expires_at
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap_or_else(SystemTime::now);

        Ok(CachedToken {
            access_token: stored.access_token,
            expires_at,
        })
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh_user_token(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
    ) -> Result<StoredToken> {
        let token_uri = client.token_uri.as_deref().unwrap_or(TOKEN_URI);
        let response = self
            .request_token(
                token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        Ok(StoredToken {
            access_token: response.access_token,
            // Google omits the refresh token on refresh; keep the old one.
            refresh_token: response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            token_type: response.token_type,
            expires_at: Some(now_secs() + response.expires_in),
        })
    }

    /// The consent URL the user visits to obtain an authorization code.
    pub fn authorization_url(&self, client: &OAuthClient) -> Result<Url> {
        let auth_uri = client.auth_uri.as_deref().unwrap_or(AUTH_URI);
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            auth_uri,
            &[
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", redirect_uri(client)),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("state", "state-token"),
            ],
        )
        .map_err(|e| DriveError::AuthenticationError(format!("invalid auth_uri {}: {}", auth_uri, e)))
    }

    async fn authorize_from_console(&self, client: &OAuthClient) -> Result<StoredToken> {
        let url = self.authorization_url(client)?;
        println!(
            "Go to the following link in your browser then type the authorization code:\n{}",
            url
        );

        let mut code = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut code)
            .await?;
        let code = code.trim();
        if code.is_empty() {
            return Err(DriveError::AuthenticationError(
                "no authorization code entered".to_string(),
            ));
        }

        self.exchange_code(client, code).await
    }

    /// Exchange an authorization code for a user token.
    pub async fn exchange_code(&self, client: &OAuthClient, code: &str) -> Result<StoredToken> {
        let token_uri = client.token_uri.as_deref().unwrap_or(TOKEN_URI);
        let response = self
            .request_token(
                token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                    ("redirect_uri", redirect_uri(client)),
                ],
            )
            .await?;

        Ok(StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_at: Some(now_secs() + response.expires_in),
        })
    }

    async fn request_token(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.client.post(token_uri).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

fn redirect_uri(client: &OAuthClient) -> &str {
    client
        .redirect_uris
        .first()
        .map(String::as_str)
        .unwrap_or("http://localhost")
}

/// Read a cached user token. A missing file is not an error.
pub fn load_token(path: &Path) -> Result<Option<StoredToken>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persist a user token, readable only by the current user on Unix.
pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(serde_json::to_string_pretty(token)?.as_bytes())?;
    info!(path = %path.display(), "saved OAuth token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_client(token_uri: &str) -> OAuthClient {
        OAuthClient {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            auth_uri: None,
            token_uri: Some(token_uri.to_string()),
            redirect_uris: vec![],
        }
    }

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            iss: "test@example.iam.gserviceaccount.com".to_string(),
            scope: DRIVE_SCOPE.to_string(),
            aud: TOKEN_URI.to_string(),
            iat: 1234567890,
            exp: 1234571490,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("test@example.iam.gserviceaccount.com"));
        assert!(json.contains(DRIVE_SCOPE));
    }

    #[tokio::test]
    async fn test_static_token() {
        let auth = Authenticator::with_access_token("abc");
        assert_eq!(auth.get_access_token().await.unwrap(), "abc");
    }

    #[test]
    fn test_token_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        assert!(load_token(&path).unwrap().is_none());

        let token = StoredToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: Some(42),
        };
        save_token(&path, &token).unwrap();
        assert_eq!(load_token(&path).unwrap(), Some(token));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_fresh_cached_user_token_skips_network() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        save_token(
            &path,
            &StoredToken {
                access_token: "cached".to_string(),
                refresh_token: None,
                token_type: "Bearer".to_string(),
                expires_at: Some(now_secs() + 3600),
            },
        )
        .unwrap();

        // Unroutable token endpoint: any network call would fail the test.
        let auth = Authenticator::authorized_user(test_client("http://127.0.0.1:9/token"), &path);
        assert_eq!(auth.get_access_token().await.unwrap(), "cached");
    }

    #[test]
    fn test_authorization_url() {
        let auth = Authenticator::with_access_token("unused").with_scopes([DRIVE_SCOPE]);
        let url = auth.authorization_url(&test_client(TOKEN_URI)).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(AUTH_URI));
        assert!(query.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(query.contains(&("scope".to_string(), DRIVE_SCOPE.to_string())));
        assert!(query.contains(&("client_id".to_string(), "client-id".to_string())));
    }
}
