//! OAuth 2.0 for the Google Calendar API.
//!
//! The credential cache uses the same authorized-user JSON layout as Google's
//! client libraries, so an existing `token.json` keeps working. A fresh
//! authorization runs the installed-application loopback flow: a short-lived
//! HTTP listener on `127.0.0.1`, the consent page opened in the browser, and
//! the returned code exchanged at the token endpoint.

use crate::calendar::CalendarError;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Installed-app client descriptor from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.into()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn parse(contents: &str) -> Result<Self, CalendarError> {
        let file: ClientSecretsFile = serde_json::from_str(contents)?;
        file.installed.or(file.web).ok_or_else(|| {
            CalendarError::Auth("client secret file has neither an 'installed' nor a 'web' client".into())
        })
    }

    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let contents = fs::read_to_string(path)
            .map_err(|_| CalendarError::MissingClientSecret(path.to_path_buf()))?;
        Self::parse(&contents)
    }
}

/// Cached authorized-user credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn load(path: &Path) -> Result<Option<Self>, CalendarError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), CalendarError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now,
            None => false,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.token = Some(response.access_token);
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(String::from).collect();
        }
        self.expiry = response.expires_in.map(|s| now + Duration::seconds(s));
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

async fn post_token_form(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, CalendarError> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(e) => e.error_description.unwrap_or(e.error),
            Err(_) => body,
        };
        return Err(CalendarError::Auth(format!("token endpoint returned {status}: {message}")));
    }
    Ok(response.json::<TokenResponse>().await?)
}

/// Exchanges the refresh token for a new access token in place.
pub async fn refresh(http: &reqwest::Client, credential: &mut Credential) -> Result<(), CalendarError> {
    let refresh_token = credential
        .refresh_token
        .clone()
        .ok_or_else(|| CalendarError::Auth("credential has no refresh token".into()))?;
    let response = post_token_form(
        http,
        &credential.token_uri,
        &[
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ],
    )
    .await?;
    credential.apply(response, Utc::now());
    log::info!("Calendar access token refreshed");
    Ok(())
}

pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Consent page URL for the loopback flow.
pub fn authorization_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
) -> Result<Url, CalendarError> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| CalendarError::Auth(format!("bad auth_uri '{}': {e}", secrets.auth_uri)))
}

fn request_target(request: &str) -> Result<Url, CalendarError> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| CalendarError::Auth("malformed redirect request".into()))?;
    Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| CalendarError::Auth(format!("malformed redirect target: {e}")))
}

/// True for the consent redirect itself, as opposed to a favicon fetch or
/// an empty preconnect.
fn is_redirect(request: &str) -> bool {
    request_target(request)
        .map(|url| url.query_pairs().any(|(key, _)| key == "code" || key == "error"))
        .unwrap_or(false)
}

/// Pulls the authorization code out of the redirect's request line
/// (`GET /?state=..&code=.. HTTP/1.1`), checking `state`.
pub fn parse_redirect(request: &str, expected_state: &str) -> Result<String, CalendarError> {
    let url = request_target(request)?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(CalendarError::Auth(format!("authorization denied: {value}"))),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        return Err(CalendarError::Auth("authorization state mismatch".into()));
    }
    code.ok_or_else(|| CalendarError::Auth("redirect carried no authorization code".into()))
}

const REDIRECT_PAGE: &str = "<html><body><p>Digital Dog is now connected to your calendar. \
You may close this window.</p></body></html>";

const NOT_FOUND: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// How long the user has to finish the consent page.
const REDIRECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// A connection that sends nothing within this window is dropped.
const REQUEST_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Waits for the consent redirect on `listener` and returns its code.
///
/// Connections that are not the redirect get a 404 and are skipped. Gives up
/// with `CalendarError::Auth` once `wait` elapses.
async fn await_redirect(
    listener: &TcpListener,
    state: &str,
    wait: std::time::Duration,
) -> Result<String, CalendarError> {
    tokio::time::timeout(wait, accept_redirect(listener, state))
        .await
        .map_err(|_| CalendarError::Auth("authorization timed out".into()))?
}

async fn accept_redirect(listener: &TcpListener, state: &str) -> Result<String, CalendarError> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let mut buf = vec![0u8; 8192];
        let n = match tokio::time::timeout(REQUEST_READ_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                log::debug!("Dropping loopback connection from {peer}: {e}");
                continue;
            }
            Err(_) => {
                log::debug!("Loopback connection from {peer} sent nothing");
                continue;
            }
        };
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();

        if !is_redirect(&request) {
            let _ = stream.write_all(NOT_FOUND.as_bytes()).await;
            let _ = stream.shutdown().await;
            continue;
        }

        let outcome = parse_redirect(&request, state);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            REDIRECT_PAGE.len(),
            REDIRECT_PAGE
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
        return outcome;
    }
}

/// Runs the interactive installed-app flow and returns a fresh credential.
pub async fn run_installed_flow(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    scopes: &[&str],
) -> Result<Credential, CalendarError> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://localhost:{port}/");
    let state = generate_state();
    let url = authorization_url(secrets, &redirect_uri, scopes, &state)?;

    log::info!("Opening browser for calendar authorization");
    if let Err(e) = tauri_plugin_opener::open_url(url.as_str(), None::<&str>) {
        log::warn!("Could not open browser ({e}); visit {url} to authorize");
    }

    let code = await_redirect(&listener, &state, REDIRECT_TIMEOUT).await?;
    let token = post_token_form(
        http,
        &secrets.token_uri,
        &[
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ],
    )
    .await?;

    let mut credential = Credential {
        token: None,
        refresh_token: None,
        token_uri: secrets.token_uri.clone(),
        client_id: secrets.client_id.clone(),
        client_secret: secrets.client_secret.clone(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        expiry: None,
    };
    credential.apply(token, Utc::now());
    log::info!("Calendar authorization complete");
    Ok(credential)
}
