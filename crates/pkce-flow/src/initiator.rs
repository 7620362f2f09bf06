//! Flow initiation and the upstream authorization redirect
//!
//! Starting a flow generates a PKCE pair and a `state`, binds them in the
//! correlation store and hands back the parameters the caller appends to the
//! provider's authorization URL. Nothing here touches the network.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::pkce::{PkcePair, generate_state};
use crate::store::CorrelationStore;

/// Provider-specific parts of the authorization URL.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeEndpoint {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: String,
}

/// Flow parameters carried through the redirect. Contains the challenge,
/// never the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectParameters {
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl RedirectParameters {
    /// Build the full provider authorization URL.
    pub fn authorization_url(&self, endpoint: &AuthorizeEndpoint) -> Result<Url> {
        let mut url = Url::parse(&endpoint.authorize_url).map_err(|e| {
            Error::UpstreamExchange(format!(
                "invalid authorize_url {}: {e}",
                endpoint.authorize_url
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &endpoint.client_id)
                .append_pair("redirect_uri", &endpoint.redirect_uri);
            if !endpoint.scopes.is_empty() {
                query.append_pair("scope", &endpoint.scopes);
            }
            query
                .append_pair("state", &self.state)
                .append_pair("code_challenge", &self.code_challenge)
                .append_pair("code_challenge_method", self.code_challenge_method);
        }
        Ok(url)
    }
}

/// Output of [`FlowInitiator::start_flow`].
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub state: String,
    pub challenge: String,
    pub redirect: RedirectParameters,
}

/// Starts login attempts against a shared correlation store.
pub struct FlowInitiator {
    store: Arc<CorrelationStore>,
    state_ttl: Duration,
}

impl FlowInitiator {
    pub fn new(store: Arc<CorrelationStore>, state_ttl: Duration) -> Self {
        Self { store, state_ttl }
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Generate PKCE material and a `state`, and bind them for `state_ttl`.
    ///
    /// A `DuplicateState` error means the caller should simply try again.
    pub async fn start_flow(&self) -> Result<FlowStart> {
        let pair = PkcePair::generate()?;
        let state = generate_state()?;

        self.store
            .put(&state, pair.verifier, self.state_ttl)
            .await?;

        info!(
            state_prefix = &state[..8],
            ttl_secs = self.state_ttl.as_secs(),
            "authorization flow started"
        );

        Ok(FlowStart {
            redirect: RedirectParameters {
                state: state.clone(),
                code_challenge: pair.challenge.clone(),
                code_challenge_method: pair.method,
            },
            state,
            challenge: pair.challenge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::compute_challenge;

    fn endpoint() -> AuthorizeEndpoint {
        AuthorizeEndpoint {
            authorize_url: "https://accounts.example.com/o/oauth2/v2/auth".into(),
            client_id: "client-123".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
            scopes: "openid profile email".into(),
        }
    }

    fn initiator() -> FlowInitiator {
        FlowInitiator::new(Arc::new(CorrelationStore::new()), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn start_flow_binds_state_to_verifier() {
        let initiator = initiator();
        let start = initiator.start_flow().await.unwrap();

        assert_eq!(initiator.store().len().await, 1);
        let verifier = initiator
            .store()
            .take_and_invalidate(&start.state)
            .await
            .unwrap();
        assert_eq!(compute_challenge(verifier.expose()), start.challenge);
        assert_eq!(start.redirect.state, start.state);
        assert_eq!(start.redirect.code_challenge, start.challenge);
        assert_eq!(start.redirect.code_challenge_method, "S256");
    }

    #[tokio::test]
    async fn redirect_never_carries_verifier() {
        let initiator = initiator();
        let start = initiator.start_flow().await.unwrap();
        let url = start.redirect.authorization_url(&endpoint()).unwrap();

        let verifier = initiator
            .store()
            .take_and_invalidate(&start.state)
            .await
            .unwrap();
        let params = serde_json::to_string(&start.redirect).unwrap();
        assert!(!url.as_str().contains(verifier.expose().as_str()));
        assert!(!params.contains(verifier.expose().as_str()));
        assert!(!url.as_str().contains("code_verifier"));
    }

    #[tokio::test]
    async fn authorization_url_contains_required_params() {
        let start = initiator().start_flow().await.unwrap();
        let url = start.redirect.authorization_url(&endpoint()).unwrap();

        assert!(url.as_str().starts_with("https://accounts.example.com/o/oauth2/v2/auth?"));
        let pairs: std::collections::HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(pairs["scope"], "openid profile email");
        assert_eq!(pairs["state"], start.state);
        assert_eq!(pairs["code_challenge"], start.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[tokio::test]
    async fn each_flow_gets_fresh_material() {
        let initiator = initiator();
        let a = initiator.start_flow().await.unwrap();
        let b = initiator.start_flow().await.unwrap();
        assert_ne!(a.state, b.state);
        assert_ne!(a.challenge, b.challenge);
        assert_eq!(initiator.store().len().await, 2);
    }

    #[test]
    fn invalid_authorize_url_is_reported() {
        let params = RedirectParameters {
            state: "s".into(),
            code_challenge: "c".into(),
            code_challenge_method: "S256",
        };
        let mut bad = endpoint();
        bad.authorize_url = "not a url".into();
        assert!(params.authorization_url(&bad).is_err());
    }
}
