// OAuth2 client-credentials token acquisition
//
// POSTs `grant_type=client_credentials` to the auth endpoint with the
// descriptor's credential data as HTTP Basic auth, then validates the JSON
// response. Caching is the caller's job.

use crate::webhooks::error::{DispatchError, Result};
use crate::webhooks::types::Auth;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, warn};

const CLIENT_CREDENTIALS_FORM: &str = "grant_type=client_credentials";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Token endpoint response body
///
/// Only `access_token` is required; the rest is informational.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds; some providers send it as a string
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub scope: Option<String>,
}

/// A validated access token
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Option<Duration>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl TokenResponse {
    /// Parse and validate a raw token endpoint body
    pub fn parse(body: &[u8]) -> Result<AccessToken> {
        let response: TokenResponse = serde_json::from_slice(body)
            .map_err(|e| DispatchError::TokenDecode(format!("invalid JSON: {e}")))?;
        response.into_access_token()
    }

    /// Require a non-empty `access_token`
    pub fn into_access_token(self) -> Result<AccessToken> {
        match self.access_token {
            Some(token) if !token.trim().is_empty() => Ok(AccessToken {
                token,
                expires_in: self.expires_in.map(Duration::from_secs),
            }),
            Some(_) => Err(DispatchError::TokenDecode(
                "access_token is empty".to_string(),
            )),
            None => Err(DispatchError::TokenDecode(
                "access_token is missing".to_string(),
            )),
        }
    }
}

/// Exchange the descriptor's credentials for an access token
pub async fn fetch_token(
    client: &reqwest::Client,
    auth: &Auth,
    timeout: Duration,
) -> Result<AccessToken> {
    debug!("Requesting OAuth2 token from {}", auth.endpoint);

    let response = client
        .post(&auth.endpoint)
        .timeout(timeout)
        .header(AUTHORIZATION, basic_authorization(&auth.data))
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(CLIENT_CREDENTIALS_FORM)
        .send()
        .await
        .map_err(|e| DispatchError::from_send(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        warn!(
            "Token endpoint {} rejected credentials with status {}",
            auth.endpoint, status
        );
        return Err(DispatchError::Authorization {
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to read token response: {e}")))?;

    TokenResponse::parse(&body)
}

/// `Basic` header value for opaque `username:password` data
fn basic_authorization(data: &str) -> String {
    format!("Basic {}", STANDARD.encode(data.as_bytes()))
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Float(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(secs)) => Some(secs),
        Some(Seconds::Float(secs)) if secs.is_finite() && secs >= 0.0 => Some(secs as u64),
        Some(Seconds::Text(text)) => text.trim().parse().ok(),
        _ => None,
    })
}
