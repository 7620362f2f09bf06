//! Upstream identity provider contract
//!
//! The token endpoint and the identity (userinfo) endpoint are external
//! collaborators. `Upstream` is the seam the exchanger talks through;
//! `HttpUpstream` is the production implementation and tests substitute
//! stubs.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::claims::{Claims, claims_from_json};
use crate::error::{Error, Result};

/// Boxed future returned by [`Upstream`] methods.
pub type UpstreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Result of a successful code exchange at the provider.
#[derive(Debug)]
pub struct UpstreamToken {
    pub access_token: Secret<String>,
    /// Seconds until the upstream access token expires (delta, not absolute)
    pub expires_in: u64,
    pub id_token: Option<Secret<String>>,
}

/// Wire shape of the token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Abstraction over the identity provider's token and identity endpoints.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Upstream>`).
pub trait Upstream: Send + Sync {
    /// Redeem an authorization code, proving possession with the PKCE verifier.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> UpstreamFuture<'a, UpstreamToken>;

    /// Whether `fetch_identity` is backed by a configured endpoint.
    fn has_identity_endpoint(&self) -> bool;

    /// Fetch identity claims with the upstream access token.
    fn fetch_identity<'a>(&'a self, access_token: &'a str) -> UpstreamFuture<'a, Claims>;
}

/// Endpoints and client credentials for [`HttpUpstream`].
#[derive(Debug, Clone, Deserialize)]
pub struct HttpUpstreamConfig {
    pub token_url: String,
    #[serde(default)]
    pub userinfo_url: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    /// Loaded from the environment or a file, never from TOML
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// `reqwest`-backed provider client.
pub struct HttpUpstream {
    client: reqwest::Client,
    config: HttpUpstreamConfig,
}

impl HttpUpstream {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(config: HttpUpstreamConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::UpstreamExchange(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: HttpUpstreamConfig) -> Self {
        Self { client, config }
    }

    async fn post_code(&self, code: &str, verifier: &str) -> Result<UpstreamToken> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.expose().as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::UpstreamExchange(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            debug!(%status, body = %body, "token endpoint rejected exchange");
            return Err(Error::UpstreamExchange(format!(
                "token endpoint returned {status}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::UpstreamExchange(format!("invalid token response: {e}")))?;

        Ok(UpstreamToken {
            access_token: Secret::new(token.access_token),
            expires_in: token.expires_in.unwrap_or(0),
            id_token: token.id_token.map(Secret::new),
        })
    }

    async fn get_identity(&self, access_token: &str) -> Result<Claims> {
        let url = self
            .config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| Error::IdentityLookup("no userinfo_url configured".into()))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::IdentityLookup(format!("userinfo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::IdentityLookup(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        let document = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::IdentityLookup(format!("invalid userinfo response: {e}")))?;
        Ok(claims_from_json(document))
    }
}

impl Upstream for HttpUpstream {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> UpstreamFuture<'a, UpstreamToken> {
        Box::pin(self.post_code(code, verifier))
    }

    fn has_identity_endpoint(&self) -> bool {
        self.config.userinfo_url.is_some()
    }

    fn fetch_identity<'a>(&'a self, access_token: &'a str) -> UpstreamFuture<'a, Claims> {
        Box::pin(self.get_identity(access_token))
    }
}
