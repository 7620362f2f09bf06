//! Secret wrapper for sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, wiped on drop.
///
/// Holds PKCE verifiers, upstream access tokens, the OAuth client secret and
/// the credential signing key.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Whether the wrapped string is empty. Used to reject blank key material
    /// without exposing it.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_redacts_debug_and_display() {
        let secret = Secret::new(String::from("pkce-verifier-value"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn secret_redacts_inside_structs() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Binding {
            state: String,
            verifier: Secret<String>,
        }

        let binding = Binding {
            state: "abc".into(),
            verifier: Secret::from(String::from("super-secret-verifier")),
        };
        let debug = format!("{binding:?}");
        assert!(debug.contains("abc"));
        assert!(!debug.contains("super-secret-verifier"));
    }

    #[test]
    fn secret_exposes_value() {
        let secret = Secret::new(String::from("jwt-signing-key"));
        assert_eq!(secret.expose(), "jwt-signing-key");
        assert!(!secret.is_empty());
        assert!(Secret::new(String::new()).is_empty());
    }
}
