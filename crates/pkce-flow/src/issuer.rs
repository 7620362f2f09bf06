//! Credential issuance and verification
//!
//! Issued credentials are compact HS256 JWTs carrying a unique `jti`, the
//! issuer name, `iat`/`exp` and the subject claims. The signing key is
//! loaded by the caller and never generated here.
//!
//! Verification is what a resource server does offline: check the
//! signature, then the expiry, then the revocation registry.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::constants::RESERVED_CLAIMS;
use crate::error::{Error, Result};
use crate::revocation::RevocationRegistry;

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// HMAC key material for signing and verifying credentials.
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Build an HS256 key. Blank key material is rejected.
    pub fn hmac(secret: &Secret<String>) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Signing("signing key is empty".into()));
        }
        let bytes = secret.expose().as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(HS256, [REDACTED])")
    }
}

/// Wire shape of the credential's claim set.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialClaims {
    jti: String,
    iss: String,
    iat: u64,
    exp: u64,
    #[serde(flatten)]
    subject: Claims,
}

/// A signed credential handed back to the caller. Immutable once signed.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Unique id (`jti`), also the revocation key
    pub id: String,
    pub subject_claims: Claims,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Compact JWS: `header.payload.signature`
    pub token: String,
}

impl IssuedCredential {
    /// The signature segment of the compact token.
    pub fn signature(&self) -> &str {
        self.token.rsplit('.').next().unwrap_or_default()
    }
}

/// Claims recovered from a credential that passed verification.
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    pub id: String,
    pub subject_claims: Claims,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Signs and verifies credentials with a key loaded at startup.
#[derive(Debug)]
pub struct TokenIssuer {
    key: SigningKey,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(key: SigningKey, issuer: impl Into<String>) -> Self {
        Self {
            key,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a credential over `claims` valid for `ttl` from now.
    ///
    /// Subject claims named like a registered claim (`jti`, `iss`, `iat`,
    /// `exp`, `nbf`) are dropped so they cannot override the issuer's values.
    /// A `ttl` that pushes `exp` past `u64::MAX` fails with `InvalidTtl`.
    pub fn issue(&self, claims: Claims, ttl: Duration) -> Result<IssuedCredential> {
        let issued_at = unix_now();
        let expires_at = issued_at
            .checked_add(ttl.as_secs())
            .ok_or_else(|| Error::InvalidTtl(format!("credential ttl {ttl:?} overflows exp")))?;

        let mut subject = claims;
        subject.retain(|name, _| {
            let reserved = RESERVED_CLAIMS.contains(&name.as_str());
            if reserved {
                warn!(claim = %name, "dropping subject claim that shadows a registered claim");
            }
            !reserved
        });

        let claim_set = CredentialClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: expires_at,
            subject,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claim_set, &self.key.encoding)
            .map_err(|e| Error::Signing(e.to_string()))?;

        debug!(credential_id = %claim_set.jti, exp = claim_set.exp, "credential signed");

        Ok(IssuedCredential {
            id: claim_set.jti,
            subject_claims: claim_set.subject,
            issued_at: claim_set.iat,
            expires_at: claim_set.exp,
            token,
        })
    }

    /// Verify signature, expiry and revocation as of now.
    pub async fn verify(
        &self,
        token: &str,
        registry: &RevocationRegistry,
    ) -> Result<VerifiedCredential> {
        self.verify_at(token, registry, unix_now()).await
    }

    /// Verify signature, expiry and revocation as of `now` (unix seconds).
    ///
    /// A credential is expired once `now >= exp`.
    pub async fn verify_at(
        &self,
        token: &str,
        registry: &RevocationRegistry,
        now: u64,
    ) -> Result<VerifiedCredential> {
        let credential = self.inspect(token)?;
        if now >= credential.expires_at {
            return Err(Error::CredentialExpired);
        }
        if registry.is_revoked(&credential.id).await {
            return Err(Error::Revoked);
        }
        Ok(credential)
    }

    /// Check signature and issuer only, ignoring expiry and revocation.
    ///
    /// Used at logout, where an already-expired credential should still be
    /// accepted for revocation.
    pub fn inspect(&self, token: &str) -> Result<VerifiedCredential> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = decode::<CredentialClaims>(token, &self.key.decoding, &validation)
            .map_err(|e| Error::InvalidCredential(e.to_string()))?;
        let claims = data.claims;

        Ok(VerifiedCredential {
            id: claims.jti,
            subject_claims: claims.subject,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
