use std::path::Path;

use pretty_assertions::assert_eq;
use quadrant_login::GoogleTokenProvider;
use quadrant_login::ProviderConfig;
use quadrant_login::SessionError;
use quadrant_login::TokenProvider;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_string_contains;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn provider_for(server: &MockServer, home: &Path) -> Result<GoogleTokenProvider, SessionError> {
    let config = ProviderConfig {
        client_id: "cid".to_string(),
        client_secret: "shhh".to_string(),
        auth_url: format!("{}/auth", server.uri()),
        token_url: format!("{}/token", server.uri()),
        revoke_url: format!("{}/revoke", server.uri()),
        userinfo_url: format!("{}/userinfo", server.uri()),
        scopes: vec!["scope-a".to_string()],
        redirect_port: 0,
    };
    GoogleTokenProvider::new(home.to_path_buf(), config)
}

fn refresh_token_file(home: &Path) -> std::path::PathBuf {
    home.join("refresh_token.json")
}

fn store_refresh_token(home: &Path, token: &str) -> TestResult {
    std::fs::write(
        refresh_token_file(home),
        serde_json::to_string(&json!({ "refresh_token": token }))?,
    )?;
    Ok(())
}

#[tokio::test]
async fn silent_grant_replays_the_stored_refresh_token() -> TestResult {
    let home = tempfile::tempdir()?;
    store_refresh_token(home.path(), "rt-1")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .and(body_string_contains("client_id=cid"))
        .and(body_string_contains("client_secret=shhh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    let grant = provider.request_token(false).await?;
    assert_eq!(grant.access_token, "at-1");
    assert_eq!(grant.expires_in, 3600);
    Ok(())
}

#[tokio::test]
async fn rotated_refresh_token_is_persisted() -> TestResult {
    let home = tempfile::tempdir()?;
    store_refresh_token(home.path(), "rt-old")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 3600,
            "refresh_token": "rt-new"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    provider.request_token(false).await?;

    let contents = std::fs::read_to_string(refresh_token_file(home.path()))?;
    let parsed: serde_json::Value = serde_json::from_str(&contents)?;
    assert_eq!(parsed["refresh_token"], "rt-new");
    Ok(())
}

#[tokio::test]
async fn silent_grant_without_a_stored_token_requires_interactive_sign_in() -> TestResult {
    let home = tempfile::tempdir()?;
    let server = MockServer::start().await;

    let provider = provider_for(&server, home.path())?;
    let err = match provider.request_token(false).await {
        Err(err) => err,
        Ok(_) => panic!("expected the silent grant to fail"),
    };
    let msg = err.to_string();
    assert!(msg.contains("interactive sign-in required"), "got {msg}");
    // Nothing reached the token endpoint.
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 0);
    Ok(())
}

#[tokio::test]
async fn token_endpoint_error_body_is_surfaced() -> TestResult {
    let home = tempfile::tempdir()?;
    store_refresh_token(home.path(), "rt-revoked")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been revoked."
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    let err = match provider.request_token(false).await {
        Err(err) => err,
        Ok(_) => panic!("expected the exchange to fail"),
    };
    assert_eq!(
        err.to_string(),
        "token exchange failed: Token has been revoked. (invalid_grant)"
    );
    Ok(())
}

#[tokio::test]
async fn revoke_posts_the_token_and_drops_the_refresh_token() -> TestResult {
    let home = tempfile::tempdir()?;
    store_refresh_token(home.path(), "rt-1")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=at-9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    provider.revoke("at-9").await?;
    assert!(!refresh_token_file(home.path()).exists());
    Ok(())
}

#[tokio::test]
async fn failed_revoke_still_clears_the_local_refresh_token() -> TestResult {
    let home = tempfile::tempdir()?;
    store_refresh_token(home.path(), "rt-1")?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_token"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    assert!(provider.revoke("at-9").await.is_err());
    // Local sign-out must not depend on the provider accepting the revoke.
    assert!(!refresh_token_file(home.path()).exists());
    Ok(())
}

#[tokio::test]
async fn fetch_profile_parses_the_userinfo_response() -> TestResult {
    let home = tempfile::tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "picture": "https://example.com/ada.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    let profile = provider.fetch_profile("at-1").await?;
    assert_eq!(profile.id, "user-1");
    assert_eq!(profile.name, "Ada Lovelace");
    assert_eq!(profile.email, "ada@example.com");
    assert_eq!(
        profile.picture_url.as_deref(),
        Some("https://example.com/ada.png")
    );
    Ok(())
}

#[tokio::test]
async fn userinfo_failure_is_a_session_error() -> TestResult {
    let home = tempfile::tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = provider_for(&server, home.path())?;
    let err = match provider.fetch_profile("at-stale").await {
        Err(err) => err,
        Ok(_) => panic!("expected the profile fetch to fail"),
    };
    let msg = err.to_string();
    assert!(msg.contains("userinfo"), "got {msg}");
    Ok(())
}
