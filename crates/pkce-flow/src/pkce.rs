//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! Generates the code verifier and S256 challenge for each login attempt,
//! plus the opaque `state` value that correlates the provider callback with
//! the attempt. The verifier stays server-side and is only sent during the
//! token exchange; the challenge goes into the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use sha2::{Digest, Sha256};

use crate::constants::CHALLENGE_METHOD;
use crate::error::{Error, Result};

/// Random bytes behind each verifier. Encodes to 86 characters, inside the
/// 43-128 range RFC 7636 allows.
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind each `state` value (43 characters encoded).
const STATE_BYTES: usize = 32;

/// A verifier and the challenge derived from it.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: Secret<String>,
    pub challenge: String,
    pub method: &'static str,
}

impl PkcePair {
    /// Generate a fresh pair from the operating system's CSPRNG.
    pub fn generate() -> Result<Self> {
        let verifier = random_urlsafe(VERIFIER_BYTES)?;
        let challenge = compute_challenge(&verifier);
        Ok(Self {
            verifier: Secret::new(verifier),
            challenge,
            method: CHALLENGE_METHOD,
        })
    }
}

/// Generate an unguessable `state` value with the same entropy source as the
/// verifier.
pub fn generate_state() -> Result<String> {
    random_urlsafe(STATE_BYTES)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Fill `len` bytes from the OS random source and encode them as URL-safe
/// base64 without padding.
fn random_urlsafe(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| Error::EntropySource(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
