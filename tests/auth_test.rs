//! Tests for the user token flow against a mocked token endpoint.

use std::time::{SystemTime, UNIX_EPOCH};

use drive_helper::auth::{load_token, save_token};
use drive_helper::models::{OAuthClient, StoredToken};
use drive_helper::{Authenticator, DriveError};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tempfile::tempdir;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn oauth_client(server: &ServerGuard) -> OAuthClient {
    OAuthClient {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        auth_uri: None,
        token_uri: Some(format!("{}/token", server.url())),
        redirect_uris: vec!["http://localhost".to_string()],
    }
}

fn stored(access_token: &str, refresh_token: Option<&str>, expires_at: u64) -> StoredToken {
    StoredToken {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        token_type: "Bearer".to_string(),
        expires_at: Some(expires_at),
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_saved() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
            Matcher::UrlEncoded("client_id".into(), "client-id".into()),
        ]))
        .with_body(json!({"access_token": "new-access", "expires_in": 3600, "token_type": "Bearer"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let cache = dir.path().join("token.json");
    save_token(&cache, &stored("old-access", Some("old-refresh"), now() - 10)).unwrap();

    let auth = Authenticator::authorized_user(oauth_client(&server), &cache);
    assert_eq!(auth.get_access_token().await.unwrap(), "new-access");
    // The in-memory cache answers the second call.
    assert_eq!(auth.get_access_token().await.unwrap(), "new-access");

    let saved = load_token(&cache).unwrap().unwrap();
    assert_eq!(saved.access_token, "new-access");
    assert_eq!(saved.refresh_token.as_deref(), Some("old-refresh"));
    assert!(saved.expires_at.unwrap() > now());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_rejected_by_endpoint() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let cache = dir.path().join("token.json");
    save_token(&cache, &stored("old-access", Some("revoked"), now() - 10)).unwrap();

    let auth = Authenticator::authorized_user(oauth_client(&server), &cache);
    let err = auth.get_access_token().await.unwrap_err();

    assert!(matches!(err, DriveError::TokenRefreshError(ref msg) if msg.contains("invalid_grant")));
    // The stale token on disk is left untouched.
    assert_eq!(load_token(&cache).unwrap().unwrap().access_token, "old-access");
}

#[tokio::test]
async fn test_exchange_code() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "4/abc".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "http://localhost".into()),
        ]))
        .with_body(
            json!({
                "access_token": "user-access",
                "refresh_token": "user-refresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = oauth_client(&server);
    let auth = Authenticator::authorized_user(client.clone(), "unused.json");
    let token = auth.exchange_code(&client, "4/abc").await.unwrap();

    assert_eq!(token.access_token, "user-access");
    assert_eq!(token.refresh_token.as_deref(), Some("user-refresh"));
    assert!(token.expires_at.unwrap() >= now() + 3500);
    mock.assert_async().await;
}
