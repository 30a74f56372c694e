//! OAuth2 token endpoint calls used during login.

use serde::Deserialize;
use tracing::debug;

use crate::client::Credentials;
use crate::IpcError;

pub const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Trade an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    creds: &Credentials,
    code: &str,
) -> Result<TokenSet, IpcError> {
    debug!("Exchanging authorization code for tokens");
    token_request(
        http,
        &[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", creds.redirect_uri.as_str()),
        ],
    )
    .await
}

/// Obtain a fresh access token from a refresh token.
pub async fn refresh(
    http: &reqwest::Client,
    creds: &Credentials,
    refresh_token: &str,
) -> Result<TokenSet, IpcError> {
    debug!("Refreshing access token");
    token_request(
        http,
        &[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )
    .await
}

async fn token_request(
    http: &reqwest::Client,
    form: &[(&str, &str)],
) -> Result<TokenSet, IpcError> {
    let tokens = http
        .post(TOKEN_URL)
        .form(form)
        .send()
        .await?
        .error_for_status()?
        .json::<TokenSet>()
        .await?;
    Ok(tokens)
}
