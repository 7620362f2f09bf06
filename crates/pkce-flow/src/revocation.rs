//! Revocation registry
//!
//! Records revoked credential ids until the credential would be rejected on
//! expiry alone, after which the record is purged. Times are unix seconds to
//! line up with the credential's `exp` claim.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::issuer::unix_now;

/// A revoked credential id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRecord {
    pub credential_id: String,
    pub revoked_at: u64,
    /// Unix seconds after which the record may be purged
    pub retain_until: u64,
}

/// Shared set of revoked credential ids.
pub struct RevocationRegistry {
    records: RwLock<HashMap<String, RevocationRecord>>,
    /// Retention for ids whose credential expiry is unknown
    default_retention: Duration,
}

impl RevocationRegistry {
    /// `default_retention` should be at least the longest credential TTL the
    /// issuer hands out.
    pub fn new(default_retention: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            default_retention,
        }
    }

    /// Revoke a credential id. Idempotent, and succeeds for ids this process
    /// never issued.
    pub async fn revoke(&self, credential_id: &str) {
        let retain_until = unix_now().saturating_add(self.default_retention.as_secs());
        self.revoke_until(credential_id, retain_until).await;
    }

    /// How long a bare `revoke` keeps its record. Credentials must not
    /// outlive this, or a revoked id could be purged before it expires.
    pub fn default_retention(&self) -> Duration {
        self.default_retention
    }

    /// Revoke a credential id whose expiry is known. An existing record keeps
    /// the later of the two retention times.
    pub async fn revoke_until(&self, credential_id: &str, retain_until: u64) {
        let now = unix_now();
        let mut records = self.records.write().await;
        match records.get_mut(credential_id) {
            Some(existing) => {
                existing.retain_until = existing.retain_until.max(retain_until);
                debug!(credential_id, "credential already revoked");
            }
            None => {
                records.insert(
                    credential_id.to_string(),
                    RevocationRecord {
                        credential_id: credential_id.to_string(),
                        revoked_at: now,
                        retain_until,
                    },
                );
                info!(credential_id, retain_until, "credential revoked");
            }
        }
    }

    pub async fn is_revoked(&self, credential_id: &str) -> bool {
        self.records.read().await.contains_key(credential_id)
    }

    pub async fn record(&self, credential_id: &str) -> Option<RevocationRecord> {
        self.records.read().await.get(credential_id).cloned()
    }

    /// Drop records whose retention has passed. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now()).await
    }

    pub(crate) async fn purge_expired_at(&self, now: u64) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.retain_until > now);
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RevocationRegistry {
        RevocationRegistry::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let registry = registry();
        registry.revoke("cred-1").await;
        assert!(registry.is_revoked("cred-1").await);

        let first = registry.record("cred-1").await.unwrap();
        registry.revoke("cred-1").await;
        assert!(registry.is_revoked("cred-1").await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.record("cred-1").await.unwrap().revoked_at, first.revoked_at);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_revoked_until_revoked() {
        let registry = registry();
        assert!(!registry.is_revoked("never-issued").await);
        registry.revoke("never-issued").await;
        assert!(registry.is_revoked("never-issued").await);
    }

    #[tokio::test]
    async fn record_is_retained_until_credential_expiry() {
        let registry = registry();
        let now = unix_now();
        registry.revoke_until("cred-1", now + 600).await;

        assert_eq!(registry.purge_expired_at(now + 599).await, 0);
        assert!(registry.is_revoked("cred-1").await);

        assert_eq!(registry.purge_expired_at(now + 600).await, 1);
        assert!(!registry.is_revoked("cred-1").await);
    }

    #[tokio::test]
    async fn repeated_revoke_keeps_longest_retention() {
        let registry = registry();
        let now = unix_now();
        registry.revoke_until("cred-1", now + 900).await;
        registry.revoke_until("cred-1", now + 60).await;

        let record = registry.record("cred-1").await.unwrap();
        assert_eq!(record.retain_until, now + 900);
    }

    #[tokio::test]
    async fn default_retention_applies_to_bare_revoke() {
        let registry = registry();
        let now = unix_now();
        registry.revoke("cred-1").await;

        let record = registry.record("cred-1").await.unwrap();
        assert!(record.retain_until >= now + 3600);
        assert!(registry.purge_expired().await == 0);
    }

    #[tokio::test]
    async fn huge_retention_saturates() {
        let registry = RevocationRegistry::new(Duration::MAX);
        registry.revoke("cred-1").await;

        let record = registry.record("cred-1").await.unwrap();
        assert_eq!(record.retain_until, u64::MAX);
        assert_eq!(registry.default_retention(), Duration::MAX);
    }
}
