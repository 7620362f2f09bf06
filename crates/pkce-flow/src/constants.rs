//! Flow constants
//!
//! Protocol identifiers and default timings. Deployment-specific values
//! (endpoints, client id, scopes) come from configuration instead.

use std::time::Duration;

/// PKCE challenge method for SHA-256 based challenges.
pub const CHALLENGE_METHOD: &str = "S256";

/// Default lifetime of a `state -> verifier` binding.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(300);

/// Upper bound accepted for the binding lifetime.
pub const MAX_STATE_TTL: Duration = Duration::from_secs(600);

/// Bindings are treated as expired this long before their nominal expiry so
/// that a skewed clock can never hand out a stale verifier.
pub const CLOCK_SKEW: Duration = Duration::from_secs(2);

/// Default lifetime of an issued credential.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(3600);

/// Upper bound accepted for the credential lifetime.
pub const MAX_CREDENTIAL_TTL: Duration = Duration::from_secs(86_400);

/// Default bound on each call to the upstream provider.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Registered JWT claim names that subject claims may not override.
pub const RESERVED_CLAIMS: &[&str] = &["jti", "iss", "iat", "exp", "nbf"];
