//! OAuth 2.0 authorization code + PKCE flow coordination
//!
//! Starts login attempts, correlates the provider callback with the attempt
//! that started it, exchanges the authorization code upstream and mints a
//! short-lived signed credential. Issued credentials can be revoked before
//! they expire. This crate is a standalone library with no dependency on the
//! gateway binary.
//!
//! Flow:
//! 1. `FlowCoordinator::start_flow()` generates PKCE material and a `state`,
//!    binds them in the `CorrelationStore`
//! 2. User authorizes at the URL from `RedirectParameters::authorization_url()`
//! 3. `FlowCoordinator::complete_flow()` takes the binding (once), redeems the
//!    code through `Upstream` and signs a credential with `TokenIssuer`
//! 4. `FlowCoordinator::logout()` / `revoke()` record the id in the
//!    `RevocationRegistry`
//! 5. `sweep::spawn_sweep_task()` evicts expired bindings and records

pub mod claims;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod initiator;
pub mod issuer;
pub mod pkce;
pub mod revocation;
pub mod store;
pub mod sweep;
pub mod upstream;

pub use claims::{ClaimValue, Claims};
pub use constants::*;
pub use coordinator::{CoordinatorSettings, FlowCoordinator, FlowEvent, FlowOutcome, FlowPhase};
pub use error::{Error, ErrorKind, Result};
pub use exchange::{ExchangeResult, Exchanger, IdentityPolicy};
pub use initiator::{AuthorizeEndpoint, FlowInitiator, FlowStart, RedirectParameters};
pub use issuer::{IssuedCredential, SigningKey, TokenIssuer, VerifiedCredential};
pub use pkce::{PkcePair, compute_challenge, generate_state};
pub use revocation::{RevocationRecord, RevocationRegistry};
pub use store::{CorrelationStore, FlowState};
pub use sweep::spawn_sweep_task;
pub use upstream::{HttpUpstream, HttpUpstreamConfig, Upstream, UpstreamToken};
