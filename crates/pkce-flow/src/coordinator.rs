//! Flow coordinator and flow state machine
//!
//! Sequences initiation, code exchange and credential issuance for many
//! independent flows, and exposes revocation. All collaborators are passed in
//! at construction so tests can substitute stubs.
//!
//! Phase transitions:
//! - Started -> AwaitingCode (state bound in the correlation store)
//! - AwaitingCode -> Exchanged (upstream exchange succeeded)
//! - Exchanged -> Issued (credential signed)
//! - any -> Failed (component error, kind attached; terminal)

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde::Serialize;
use tracing::{info, warn};

use crate::claims::{ClaimValue, Claims};
use crate::constants::{DEFAULT_CREDENTIAL_TTL, DEFAULT_STATE_TTL, DEFAULT_UPSTREAM_TIMEOUT};
use crate::error::{Error, ErrorKind, Result};
use crate::exchange::{ExchangeResult, Exchanger, IdentityPolicy};
use crate::initiator::{FlowInitiator, FlowStart};
use crate::issuer::{IssuedCredential, TokenIssuer, VerifiedCredential};
use crate::revocation::RevocationRegistry;
use crate::store::CorrelationStore;
use crate::upstream::Upstream;

/// Where a single flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum FlowPhase {
    Started,
    AwaitingCode,
    Exchanged,
    Issued,
    /// Terminal. The caller must start a fresh flow.
    Failed { kind: ErrorKind },
}

/// Events that drive phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    StateBound,
    Exchanged,
    Issued,
    Failed(ErrorKind),
}

impl FlowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowPhase::Issued | FlowPhase::Failed { .. })
    }
}

/// Apply `event` to `phase`. Pure function: no I/O.
///
/// `Failed` absorbs every event. Events that do not fit the current phase
/// fail the flow with `InvalidTransition`.
pub fn advance(phase: FlowPhase, event: FlowEvent) -> FlowPhase {
    match (phase, event) {
        (FlowPhase::Failed { kind }, _) => FlowPhase::Failed { kind },
        (_, FlowEvent::Failed(kind)) => FlowPhase::Failed { kind },
        (FlowPhase::Started, FlowEvent::StateBound) => FlowPhase::AwaitingCode,
        (FlowPhase::AwaitingCode, FlowEvent::Exchanged) => FlowPhase::Exchanged,
        (FlowPhase::Exchanged, FlowEvent::Issued) => FlowPhase::Issued,
        _ => FlowPhase::Failed {
            kind: ErrorKind::InvalidTransition,
        },
    }
}

/// Phase a flow reached at the end of a coordinator step, plus that step's
/// result. `start_flow` yields a `FlowOutcome<FlowStart>`, `complete_flow`
/// the default `FlowOutcome<IssuedCredential>`.
#[derive(Debug)]
pub struct FlowOutcome<T = IssuedCredential> {
    pub phase: FlowPhase,
    pub result: Result<T>,
}

impl<T> FlowOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Timing and policy knobs, fixed at construction.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub state_ttl: Duration,
    pub credential_ttl: Duration,
    pub upstream_timeout: Duration,
    pub identity: IdentityPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            state_ttl: DEFAULT_STATE_TTL,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            identity: IdentityPolicy::default(),
        }
    }
}

/// Root of the authorization flow.
pub struct FlowCoordinator {
    initiator: FlowInitiator,
    exchanger: Exchanger,
    issuer: TokenIssuer,
    registry: Arc<RevocationRegistry>,
    credential_ttl: Duration,
}

impl FlowCoordinator {
    pub fn new(
        store: Arc<CorrelationStore>,
        upstream: Arc<dyn Upstream>,
        issuer: TokenIssuer,
        registry: Arc<RevocationRegistry>,
        settings: CoordinatorSettings,
    ) -> Self {
        if settings.credential_ttl > registry.default_retention() {
            warn!(
                credential_ttl_secs = settings.credential_ttl.as_secs(),
                retention_secs = registry.default_retention().as_secs(),
                "credential ttl exceeds revocation retention, issuance will fail"
            );
        }
        info!(
            state_ttl_secs = settings.state_ttl.as_secs(),
            credential_ttl_secs = settings.credential_ttl.as_secs(),
            upstream_timeout_secs = settings.upstream_timeout.as_secs(),
            identity = ?settings.identity,
            "flow coordinator initialized"
        );
        Self {
            initiator: FlowInitiator::new(store.clone(), settings.state_ttl),
            exchanger: Exchanger::new(
                store,
                upstream,
                settings.upstream_timeout,
                settings.identity,
            ),
            issuer,
            registry,
            credential_ttl: settings.credential_ttl,
        }
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        self.initiator.store()
    }

    pub fn registry(&self) -> &Arc<RevocationRegistry> {
        &self.registry
    }

    /// Begin a login attempt. On success the flow is `AwaitingCode`.
    pub async fn start_flow(&self) -> FlowOutcome<FlowStart> {
        let phase = FlowPhase::Started;
        match self.initiator.start_flow().await {
            Ok(start) => FlowOutcome {
                phase: advance(phase, FlowEvent::StateBound),
                result: Ok(start),
            },
            Err(e) => self.fail(phase, e),
        }
    }

    /// Exchange a code without issuing a credential.
    pub async fn exchange(&self, state: &str, code: &str) -> Result<ExchangeResult> {
        self.exchanger.exchange(state, code).await
    }

    /// Sign a credential over `claims`.
    ///
    /// `ttl` may not exceed the registry's default retention, so a credential
    /// revoked by id stays revoked until it expires.
    pub fn issue(&self, claims: Claims, ttl: Duration) -> Result<IssuedCredential> {
        let retention = self.registry.default_retention();
        if ttl > retention {
            return Err(Error::InvalidTtl(format!(
                "credential ttl {ttl:?} exceeds revocation retention {retention:?}"
            )));
        }
        self.issuer.issue(claims, ttl)
    }

    /// Handle the provider callback: exchange `code` for the flow bound to
    /// `state`, then issue a credential with the configured TTL.
    pub async fn complete_flow(&self, state: &str, code: &str) -> FlowOutcome {
        let mut phase = FlowPhase::AwaitingCode;

        let exchanged = match self.exchanger.exchange(state, code).await {
            Ok(result) => {
                phase = advance(phase, FlowEvent::Exchanged);
                result
            }
            Err(e) => return self.fail(phase, e),
        };

        let claims = subject_claims(&exchanged);
        match self.issue(claims, self.credential_ttl) {
            Ok(credential) => {
                phase = advance(phase, FlowEvent::Issued);
                info!(
                    credential_id = %credential.id,
                    expires_at = credential.expires_at,
                    "authorization flow completed"
                );
                FlowOutcome {
                    phase,
                    result: Ok(credential),
                }
            }
            Err(e) => self.fail(phase, e),
        }
    }

    fn fail<T>(&self, phase: FlowPhase, error: Error) -> FlowOutcome<T> {
        let kind = error.kind();
        let phase = advance(phase, FlowEvent::Failed(kind));
        if kind.is_client_error() {
            info!(kind = kind.label(), "authorization flow rejected");
        } else {
            warn!(kind = kind.label(), error = %error, "authorization flow failed");
        }
        FlowOutcome {
            phase,
            result: Err(error),
        }
    }

    /// Verify a credential as a resource server would.
    pub async fn verify(&self, token: &str) -> Result<VerifiedCredential> {
        self.issuer.verify(token, &self.registry).await
    }

    /// Revoke a credential by id. Idempotent.
    pub async fn revoke(&self, credential_id: &str) {
        self.registry.revoke(credential_id).await;
    }

    pub async fn is_revoked(&self, credential_id: &str) -> bool {
        self.registry.is_revoked(credential_id).await
    }

    /// Revoke the credential presented at logout, retaining the record until
    /// the credential's own expiry. Returns the revoked id.
    ///
    /// The signature must be valid; an already expired credential is accepted.
    pub async fn logout(&self, token: &str) -> Result<String> {
        let credential = self.issuer.inspect(token)?;
        self.registry
            .revoke_until(&credential.id, credential.expires_at)
            .await;
        Ok(credential.id)
    }

    /// Abandon a pending flow early.
    pub async fn cancel(&self, state: &str) -> bool {
        self.initiator.store().cancel(state).await
    }
}

/// Claims copied into the issued credential: the identity claims, when
/// present, plus the upstream token's expiry. The upstream access token itself
/// stays server-side.
fn subject_claims(exchanged: &ExchangeResult) -> Claims {
    let mut claims = exchanged.identity_claims.clone().unwrap_or_default();
    let upstream_expires_at = exchanged
        .upstream_expiry
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    claims.insert(
        "upstream_expires_at".into(),
        ClaimValue::from(upstream_expires_at),
    );
    claims
}
