//! Authorization code exchange
//!
//! Consumes the `state` binding first and only then talks to the provider,
//! so a replayed or unknown `state` never reaches the network and the store
//! lock is never held across an outbound call. Upstream failures are not
//! retried: authorization codes are single-use, so a blind retry would fail
//! anyway.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::Secret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::error::{Error, Result};
use crate::store::CorrelationStore;
use crate::upstream::Upstream;

/// Whether identity claims are part of a successful exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Never call the identity endpoint.
    Disabled,
    /// Fetch claims; a failed lookup is logged and the exchange still succeeds.
    #[default]
    Optional,
    /// Fetch claims; a failed lookup fails the exchange.
    Required,
}

/// Outcome of a successful code exchange. Lives for one request only.
#[derive(Debug)]
pub struct ExchangeResult {
    pub upstream_access_token: Secret<String>,
    pub identity_claims: Option<Claims>,
    pub upstream_expiry: SystemTime,
}

/// Redeems authorization codes against the provider.
pub struct Exchanger {
    store: Arc<CorrelationStore>,
    upstream: Arc<dyn Upstream>,
    timeout: Duration,
    identity: IdentityPolicy,
}

impl Exchanger {
    pub fn new(
        store: Arc<CorrelationStore>,
        upstream: Arc<dyn Upstream>,
        timeout: Duration,
        identity: IdentityPolicy,
    ) -> Self {
        Self {
            store,
            upstream,
            timeout,
            identity,
        }
    }

    /// Exchange `code` for an upstream credential using the verifier bound to
    /// `state`.
    ///
    /// `NotFound` and `Expired` from the store are returned unchanged before
    /// any network call. At most one call per `state` ever reaches the
    /// provider.
    pub async fn exchange(&self, state: &str, code: &str) -> Result<ExchangeResult> {
        let verifier = self.store.take_and_invalidate(state).await?;

        let token = bounded(
            self.timeout,
            self.upstream.exchange_code(code, verifier.expose()),
            |t| Error::UpstreamExchange(format!("token exchange timed out after {t:?}")),
        )
        .await
        .inspect_err(|e| warn!(error = %e, "upstream token exchange failed"))?;

        let upstream_expiry = SystemTime::now()
            .checked_add(Duration::from_secs(token.expires_in))
            .ok_or_else(|| {
                Error::UpstreamExchange(format!("invalid expires_in: {}", token.expires_in))
            })
            .inspect_err(|e| warn!(error = %e, "upstream token response rejected"))?;
        debug!(expires_in = token.expires_in, "upstream token received");

        let identity_claims = match self.identity {
            IdentityPolicy::Disabled => None,
            IdentityPolicy::Required if !self.upstream.has_identity_endpoint() => {
                return Err(Error::IdentityLookup(
                    "identity claims required but no identity endpoint configured".into(),
                ));
            }
            IdentityPolicy::Optional if !self.upstream.has_identity_endpoint() => None,
            policy => {
                let lookup = bounded(
                    self.timeout,
                    self.upstream.fetch_identity(token.access_token.expose()),
                    |t| Error::IdentityLookup(format!("identity lookup timed out after {t:?}")),
                )
                .await;
                match lookup {
                    Ok(claims) => Some(claims),
                    Err(e) if policy == IdentityPolicy::Required => {
                        warn!(error = %e, "identity lookup failed, failing exchange");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(error = %e, "identity lookup failed, continuing without claims");
                        None
                    }
                }
            }
        };

        Ok(ExchangeResult {
            upstream_access_token: token.access_token,
            identity_claims,
            upstream_expiry,
        })
    }
}

/// Await `fut` for at most `timeout`, mapping expiry through `on_timeout`.
async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
    on_timeout: impl FnOnce(Duration) -> Error,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(timeout)),
    }
}
