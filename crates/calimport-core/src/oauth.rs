//! One-time consent flow producing an `authorized_user` credentials file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::google::{CALENDAR_SCOPE, Credentials};

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_REDIRECT_PORT: u16 = 8787;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("failed to bind callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("callback did not include an authorization code")]
    MissingCode,
    #[error("callback state did not match the request")]
    StateMismatch,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("token response did not include a refresh token")]
    MissingRefreshToken,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// OAuth client registered for the desktop application.
#[derive(Debug, Clone)]
pub struct ConsentClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Generate OAuth2 PKCE code verifier and challenge.
pub fn generate_pkce_pair() -> (String, String) {
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use sha2::{Digest, Sha256};

    let code_verifier = URL_SAFE_NO_PAD.encode(random_bytes::<32>());

    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (code_verifier, code_challenge)
}

pub fn generate_state() -> String {
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    URL_SAFE_NO_PAD.encode(random_bytes::<16>())
}

fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;

    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

pub fn build_consent_url(
    client_id: &str,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> String {
    let params = [
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", CALENDAR_SCOPE),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("code_challenge", code_challenge),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];

    let query = params
        .into_iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{AUTH_URL}?{query}")
}

/// Query parameters the authorization server sends back to the loopback listener.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    fn is_empty(&self) -> bool {
        self.code.is_none() && self.state.is_none() && self.error.is_none()
    }
}

/// Extract the callback parameters from a raw `GET /?code=...` request.
pub fn parse_callback(request: &str) -> CallbackParams {
    let mut params = CallbackParams::default();
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return params;
    };
    let Some((_, query)) = target.split_once('?') else {
        return params;
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "code" => params.code = Some(value),
            "state" => params.state = Some(value),
            "error" => params.error = Some(value),
            _ => {}
        }
    }
    params
}

/// Run the browser consent flow and return credentials holding a refresh token.
///
/// `announce` receives the consent URL so the caller can print it.
pub async fn run_consent_flow<F>(
    client: &ConsentClient,
    port: u16,
    open_browser: bool,
    announce: F,
) -> Result<Credentials, OAuthError>
where
    F: FnOnce(&str),
{
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|source| OAuthError::Bind { port, source })?;
    let bound_port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{bound_port}");

    let (code_verifier, code_challenge) = generate_pkce_pair();
    let state = generate_state();
    let url = build_consent_url(&client.client_id, &redirect_uri, &code_challenge, &state);

    announce(&url);
    if open_browser {
        if let Err(err) = open::that(&url) {
            warn!(error = %err, "Failed to open browser; visit the URL manually");
        }
    }

    let params = accept_callback(&listener).await?;
    if let Some(error) = params.error {
        return Err(OAuthError::Denied(error));
    }
    if params.state.as_deref() != Some(state.as_str()) {
        return Err(OAuthError::StateMismatch);
    }
    let code = params.code.ok_or(OAuthError::MissingCode)?;

    exchange_code(client, &code, &code_verifier, &redirect_uri).await
}

async fn accept_callback(listener: &TcpListener) -> Result<CallbackParams, OAuthError> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let mut buffer = vec![0u8; 8192];
        let n = stream.read(&mut buffer).await?;
        let request = String::from_utf8_lossy(&buffer[..n]);
        let params = parse_callback(&request);
        debug!(%peer, "Received loopback request");

        // Browsers also ask for /favicon.ico; keep waiting for the real callback.
        if params.is_empty() {
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await?;
            continue;
        }

        let body = if params.code.is_some() {
            "<html><body><h1>Authorization complete</h1>\
             <p>You can close this window and return to the terminal.</p></body></html>"
        } else {
            "<html><body><h1>Authorization failed</h1>\
             <p>No authorization code was received.</p></body></html>"
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        return Ok(params);
    }
}

/// Exchange an authorization code for a refresh token.
pub async fn exchange_code(
    client: &ConsentClient,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<Credentials, OAuthError> {
    #[derive(Deserialize)]
    struct ExchangeResponse {
        #[serde(default)]
        refresh_token: Option<String>,
    }

    let response = Client::new()
        .post(&client.token_url)
        .form(&[
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(OAuthError::Exchange(format!("{status}: {}", body.trim())));
    }

    let body: ExchangeResponse = response.json().await?;
    let refresh_token = body.refresh_token.ok_or(OAuthError::MissingRefreshToken)?;
    info!("Authorization code exchanged for a refresh token");

    Ok(Credentials::authorized_user(
        &client.client_id,
        &client.client_secret,
        &refresh_token,
    ))
}

/// Write credentials as pretty JSON, readable only by the owner on Unix.
pub fn write_credentials(path: &Path, credentials: &Credentials) -> Result<(), OAuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_string_pretty(credentials)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(serialized.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
