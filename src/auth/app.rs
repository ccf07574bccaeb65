use crate::Result;
use crate::config::AppAuthConfig;
use chrono::{DateTime, Utc};
use core::fmt::{Debug, Formatter};
use core::time::Duration;
use futures::future::BoxFuture;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ohno::{IntoAppError, bail};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::fs;
use url::Url;

const LOG_TARGET: &str = "      auth";

/// Backdate `iat` to tolerate clock drift between us and the API.
const JWT_BACKDATE_SECS: i64 = 60;

/// GitHub rejects App JWTs that live longer than ten minutes.
const JWT_LIFETIME_SECS: i64 = 9 * 60;

/// Source of fresh access tokens.
pub trait TokenIssuer: Send + Sync + Debug {
    /// Mint a new token.
    fn issue(&self) -> BoxFuture<'_, Result<String>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
}

/// Mints installation tokens for a GitHub App.
///
/// A short-lived RS256 JWT signed with the App's private key is exchanged for an installation
/// access token via `POST /app/installations/{id}/access_tokens`.
pub struct InstallationTokenIssuer {
    client: reqwest::Client,
    endpoint: Url,
    app_id: u64,
    key: EncodingKey,
}

impl Debug for InstallationTokenIssuer {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InstallationTokenIssuer")
            .field("endpoint", &self.endpoint.as_str())
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl InstallationTokenIssuer {
    /// Create an issuer, loading the App's private key from disk.
    pub fn new(app: &AppAuthConfig, api_base: &Url, timeout: Duration, user_agent: &str) -> Result<Self> {
        let pem = fs::read(&app.key_path).into_app_err_with(|| format!("reading GitHub App key from {}", app.key_path))?;
        let key = EncodingKey::from_rsa_pem(&pem).into_app_err_with(|| format!("parsing GitHub App key from {}", app.key_path))?;

        let installation_id = app.installation_id.to_string();
        let mut endpoint = api_base.clone();
        let _ = endpoint
            .path_segments_mut()
            .ok()
            .into_app_err_with(|| format!("API URL '{api_base}' cannot carry a path"))?
            .pop_if_empty()
            .extend(["app", "installations", installation_id.as_str(), "access_tokens"]);

        Ok(Self {
            client: reqwest::Client::builder().user_agent(user_agent).timeout(timeout).build()?,
            endpoint,
            app_id: app.app_id,
            key,
        })
    }

    fn app_jwt(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AppClaims {
            iat: now.timestamp() - JWT_BACKDATE_SECS,
            exp: now.timestamp() + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).into_app_err("signing GitHub App JWT")
    }

    async fn request_token(&self) -> Result<String> {
        let jwt = self.app_jwt(Utc::now())?;

        log::debug!(target: LOG_TARGET, "requesting installation token from {}", self.endpoint);

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(jwt)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .into_app_err_with(|| format!("requesting installation token from {}", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("installation token request to {} failed with HTTP status {status}", self.endpoint);
        }

        let body: InstallationToken = resp.json().await.into_app_err("decoding installation token response")?;
        if body.token.trim().is_empty() {
            bail!("installation token response from {} carried an empty token", self.endpoint);
        }

        log::info!(target: LOG_TARGET, "obtained a new installation token for app {}", self.app_id);
        Ok(body.token)
    }
}

impl TokenIssuer for InstallationTokenIssuer {
    fn issue(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.request_token())
    }
}
