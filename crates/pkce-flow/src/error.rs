//! Error types for authorization flow operations

use serde::Serialize;

/// Errors from any stage of the authorization flow.
///
/// Client errors (`DuplicateState`, `NotFound`, `Expired`, and the credential
/// verification failures) mean the caller must restart the login. Server
/// errors (`EntropySource`, `UpstreamExchange`, `IdentityLookup`, `Signing`,
/// `InvalidTtl`) carry internal detail for logs only; use
/// [`Error::public_message`] for anything shown to an end user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entropy source unavailable: {0}")]
    EntropySource(String),

    #[error("state is already bound to a live flow")]
    DuplicateState,

    #[error("no pending flow for this state")]
    NotFound,

    #[error("flow state expired")]
    Expired,

    #[error("upstream token exchange failed: {0}")]
    UpstreamExchange(String),

    #[error("identity lookup failed: {0}")]
    IdentityLookup(String),

    #[error("credential signing failed: {0}")]
    Signing(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential expired")]
    CredentialExpired,

    #[error("credential revoked")]
    Revoked,

    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
}

/// Fieldless classification of an [`Error`], attached to failed flows and
/// used as a metrics/log label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EntropySource,
    DuplicateState,
    NotFound,
    Expired,
    UpstreamExchange,
    IdentityLookup,
    Signing,
    InvalidCredential,
    CredentialExpired,
    Revoked,
    InvalidTtl,
    /// A flow event arrived in a phase that cannot accept it.
    InvalidTransition,
}

impl ErrorKind {
    /// Whether the failure was caused by the caller (bad, expired, replayed
    /// or revoked input) rather than by this server or its collaborators.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::DuplicateState
                | ErrorKind::NotFound
                | ErrorKind::Expired
                | ErrorKind::InvalidCredential
                | ErrorKind::CredentialExpired
                | ErrorKind::Revoked
                | ErrorKind::InvalidTransition
        )
    }

    /// Label for logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::EntropySource => "entropy_source",
            ErrorKind::DuplicateState => "duplicate_state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::UpstreamExchange => "upstream_exchange",
            ErrorKind::IdentityLookup => "identity_lookup",
            ErrorKind::Signing => "signing",
            ErrorKind::InvalidCredential => "invalid_credential",
            ErrorKind::CredentialExpired => "credential_expired",
            ErrorKind::Revoked => "revoked",
            ErrorKind::InvalidTtl => "invalid_ttl",
            ErrorKind::InvalidTransition => "invalid_transition",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EntropySource(_) => ErrorKind::EntropySource,
            Error::DuplicateState => ErrorKind::DuplicateState,
            Error::NotFound => ErrorKind::NotFound,
            Error::Expired => ErrorKind::Expired,
            Error::UpstreamExchange(_) => ErrorKind::UpstreamExchange,
            Error::IdentityLookup(_) => ErrorKind::IdentityLookup,
            Error::Signing(_) => ErrorKind::Signing,
            Error::InvalidCredential(_) => ErrorKind::InvalidCredential,
            Error::CredentialExpired => ErrorKind::CredentialExpired,
            Error::Revoked => ErrorKind::Revoked,
            Error::InvalidTtl(_) => ErrorKind::InvalidTtl,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind().is_client_error()
    }

    /// Message safe to show to an end user. Never includes upstream response
    /// bodies or key material.
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::DuplicateState => "login could not be started, please try again",
            kind if kind.is_client_error() => "unauthorized or expired, please restart login",
            ErrorKind::UpstreamExchange | ErrorKind::IdentityLookup => {
                "sign-in with the identity provider failed"
            }
            _ => "internal error",
        }
    }
}

/// Result alias for flow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_are_distinguished() {
        assert!(Error::NotFound.is_client_error());
        assert!(Error::Expired.is_client_error());
        assert!(Error::Revoked.is_client_error());
        assert!(!Error::UpstreamExchange("timeout".into()).is_client_error());
        assert!(!Error::Signing("no key".into()).is_client_error());
        assert!(!Error::EntropySource("getrandom".into()).is_client_error());
        assert!(!Error::InvalidTtl("overflow".into()).is_client_error());
    }

    #[test]
    fn public_message_hides_internal_detail() {
        let err = Error::UpstreamExchange("token endpoint returned 400: {\"error\":\"x\"}".into());
        assert!(!err.public_message().contains("400"));
        assert!(err.to_string().contains("400"));

        let err = Error::Signing("HMAC key material rejected".into());
        assert_eq!(err.public_message(), "internal error");

        assert_eq!(
            Error::Expired.public_message(),
            "unauthorized or expired, please restart login"
        );
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UpstreamExchange).unwrap();
        assert_eq!(json, "\"upstream_exchange\"");
        assert_eq!(ErrorKind::NotFound.label(), "not_found");
    }
}
