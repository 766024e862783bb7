//! Loopback OAuth flow against Google: an interactive grant opens the
//! system browser and catches the redirect on a localhost listener; the
//! silent grant replays the stored refresh token. The refresh token is a
//! provider credential and lives in its own file next to the session, never
//! inside it.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine as _;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use url::Url;

use crate::token_provider::SessionError;
use crate::token_provider::TokenGrant;
use crate::token_provider::TokenProvider;
use crate::token_provider::UserProfile;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";
pub const TASKS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/tasks.readonly";

const SUCCESS_PAGE: &str = "<html><body><h2>Signed in</h2>\
<p>You can close this tab and return to the terminal.</p></body></html>";

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// Port for the loopback redirect listener; 0 picks an ephemeral port.
    pub redirect_port: u16,
}

impl ProviderConfig {
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: vec![TASKS_SCOPE.to_string(), TASKS_READONLY_SCOPE.to_string()],
            redirect_port: 0,
        }
    }
}

pub struct GoogleTokenProvider {
    home: PathBuf,
    config: ProviderConfig,
    http: reqwest::Client,
}

impl GoogleTokenProvider {
    pub fn new(home: PathBuf, config: ProviderConfig) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SessionError::Exchange(format!("failed to build http client: {e}")))?;
        Ok(Self { home, config, http })
    }

    async fn interactive_grant(&self) -> Result<TokenGrant, SessionError> {
        let config = self.config.clone();
        let outcome = tokio::task::spawn_blocking(move || run_loopback_flow(&config))
            .await
            .map_err(|e| SessionError::Exchange(format!("sign-in task failed: {e}")))??;
        self.exchange_code(&outcome.code, &outcome.verifier, &outcome.redirect_uri)
            .await
    }

    async fn silent_grant(&self) -> Result<TokenGrant, SessionError> {
        let Some(refresh_token) = read_refresh_token(&self.home)? else {
            return Err(SessionError::Exchange(
                "no refresh token on file; interactive sign-in required".to_string(),
            ));
        };
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| SessionError::Exchange(format!("token endpoint unreachable: {e}")))?;
        self.grant_from_response(res).await
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, SessionError> {
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| SessionError::Exchange(format!("token endpoint unreachable: {e}")))?;
        self.grant_from_response(res).await
    }

    async fn grant_from_response(&self, res: reqwest::Response) -> Result<TokenGrant, SessionError> {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SessionError::Exchange(format_token_error(status, &body)));
        }
        let token: TokenResponse = serde_json::from_str(&body)?;
        if let Some(refresh) = &token.refresh_token {
            write_refresh_token(&self.home, refresh)?;
        }
        Ok(TokenGrant {
            access_token: token.access_token,
            expires_in: token.expires_in.unwrap_or(3600),
        })
    }
}

#[async_trait::async_trait]
impl TokenProvider for GoogleTokenProvider {
    async fn request_token(&self, interactive: bool) -> Result<TokenGrant, SessionError> {
        if interactive {
            self.interactive_grant().await
        } else {
            self.silent_grant().await
        }
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        // The refresh token dies with the grant, so drop our copy up front;
        // local sign-out must succeed even when the provider is unreachable.
        clear_refresh_token(&self.home)?;
        let res = self
            .http
            .post(&self.config.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| SessionError::Exchange(format!("revoke endpoint unreachable: {e}")))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SessionError::Exchange(format_token_error(status, &body)));
        }
        Ok(())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, SessionError> {
        let res = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SessionError::Exchange(format!("userinfo endpoint unreachable: {e}")))?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SessionError::Exchange(format!(
                "userinfo request returned {status}"
            )));
        }
        let profile: UserProfile = serde_json::from_str(&body)?;
        Ok(profile)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn format_token_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body)
        && !err.error.is_empty()
    {
        return match err.error_description {
            Some(desc) if !desc.is_empty() => format!("{desc} ({})", err.error),
            _ => err.error,
        };
    }
    format!("token endpoint returned {status}")
}

struct LoopbackOutcome {
    code: String,
    verifier: String,
    redirect_uri: String,
}

fn run_loopback_flow(config: &ProviderConfig) -> Result<LoopbackOutcome, SessionError> {
    let server = tiny_http::Server::http(("127.0.0.1", config.redirect_port))
        .map_err(|e| SessionError::Exchange(format!("failed to bind loopback listener: {e}")))?;
    let port = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.port())
        .ok_or_else(|| SessionError::Exchange("loopback listener has no ip address".to_string()))?;
    let redirect_uri = format!("http://127.0.0.1:{port}");

    let verifier = random_token(64);
    let challenge = pkce_challenge(&verifier);
    let state = random_token(32);
    let auth_url = build_auth_url(config, &redirect_uri, &challenge, &state)?;

    tracing::info!("opening browser for sign-in: {auth_url}");
    if webbrowser::open(auth_url.as_str()).is_err() {
        tracing::warn!("could not open a browser; visit the URL above to continue");
    }

    for request in server.incoming_requests() {
        let Some(params) = parse_redirect_query(request.url()) else {
            respond(request, 404, "Not found");
            continue;
        };
        if let Some(error) = params.get("error") {
            let detail = match params.get("error_description") {
                Some(desc) => format!("{error}: {desc}"),
                None => error.clone(),
            };
            respond(request, 400, "Sign-in failed. You can close this tab.");
            return Err(SessionError::Exchange(detail));
        }
        match (params.get("code"), params.get("state")) {
            (Some(code), Some(got)) if *got == state => {
                let code = code.clone();
                respond(request, 200, SUCCESS_PAGE);
                return Ok(LoopbackOutcome {
                    code,
                    verifier,
                    redirect_uri,
                });
            }
            (Some(_), _) => {
                respond(request, 400, "State mismatch. You can close this tab.");
                return Err(SessionError::Exchange(
                    "state parameter mismatch on redirect".to_string(),
                ));
            }
            _ => respond(request, 404, "Not found"),
        }
    }
    Err(SessionError::Exchange(
        "loopback listener closed before the redirect arrived".to_string(),
    ))
}

fn build_auth_url(
    config: &ProviderConfig,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> Result<Url, SessionError> {
    Url::parse_with_params(
        &config.auth_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", &config.scopes.join(" ")),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("state", state),
            // Ask for a refresh token so silent renewal works later.
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| SessionError::Exchange(format!("invalid authorization url: {e}")))
}

fn parse_redirect_query(request_url: &str) -> Option<HashMap<String, String>> {
    let url = Url::parse(&format!("http://127.0.0.1{request_url}")).ok()?;
    if url.path() != "/" {
        return None;
    }
    let params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if params.is_empty() {
        return None;
    }
    Some(params)
}

fn respond(request: tiny_http::Request, status: u16, body: &str) {
    let mut response = tiny_http::Response::from_string(body).with_status_code(status);
    if let Ok(header) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
    {
        response = response.with_header(header);
    }
    let _ = request.respond(response);
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    std::iter::repeat_with(|| rng.sample(rand::distr::Alphanumeric))
        .take(len)
        .map(char::from)
        .collect()
}

fn pkce_challenge(verifier: &str) -> String {
    let digest = sha2::Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[derive(Serialize, Deserialize)]
struct RefreshTokenDotJson {
    refresh_token: String,
}

fn get_refresh_token_file(quadrant_home: &Path) -> PathBuf {
    quadrant_home.join("refresh_token.json")
}

fn read_refresh_token(quadrant_home: &Path) -> std::io::Result<Option<String>> {
    let path = get_refresh_token_file(quadrant_home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let parsed: RefreshTokenDotJson = serde_json::from_str(&contents)?;
    Ok(Some(parsed.refresh_token))
}

fn write_refresh_token(quadrant_home: &Path, refresh_token: &str) -> std::io::Result<()> {
    let json_data = serde_json::to_string_pretty(&RefreshTokenDotJson {
        refresh_token: refresh_token.to_string(),
    })?;
    let mut options = std::fs::OpenOptions::new();
    options.truncate(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(get_refresh_token_file(quadrant_home))?;
    use std::io::Write as _;
    file.write_all(json_data.as_bytes())?;
    file.flush()?;
    Ok(())
}

fn clear_refresh_token(quadrant_home: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(get_refresh_token_file(quadrant_home)) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pkce_challenge_is_base64url_of_sha256() {
        // RFC 7636 appendix B test vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn redirect_query_parses_code_and_state() {
        let params = parse_redirect_query("/?code=abc&state=xyz");
        let params = params.unwrap_or_default();
        assert_eq!(params.get("code").map(String::as_str), Some("abc"));
        assert_eq!(params.get("state").map(String::as_str), Some("xyz"));
    }

    #[test]
    fn non_redirect_requests_are_ignored() {
        assert!(parse_redirect_query("/favicon.ico").is_none());
        assert!(parse_redirect_query("/").is_none());
    }

    #[test]
    fn token_errors_prefer_the_description() {
        let body = "{\"error\":\"invalid_grant\",\"error_description\":\"Token has been revoked.\"}";
        let msg = format_token_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(msg, "Token has been revoked. (invalid_grant)");

        let msg = format_token_error(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(msg, "token endpoint returned 502 Bad Gateway");
    }

    #[test]
    fn refresh_token_round_trips_through_its_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        assert_eq!(read_refresh_token(dir.path())?, None);
        write_refresh_token(dir.path(), "rt-123")?;
        assert_eq!(read_refresh_token(dir.path())?, Some("rt-123".to_string()));
        clear_refresh_token(dir.path())?;
        assert_eq!(read_refresh_token(dir.path())?, None);
        // Clearing twice is fine.
        clear_refresh_token(dir.path())?;
        Ok(())
    }
}
