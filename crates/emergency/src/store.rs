//! Grant store port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crewdesk_core::{GrantId, TenantId, UserId};

use crate::grant::EmergencyGrant;
use crate::token::TokenHash;

#[derive(Debug, Error)]
pub enum GrantStoreError {
    #[error("grant store unavailable: {0}")]
    Unavailable(String),

    #[error("grant conflict: {0}")]
    Conflict(String),
}

/// Persistence seam for emergency grants.
///
/// `mark_used` is the load-bearing operation: it must be a genuine
/// compare-and-set so that two concurrent redemptions of one token can never
/// both succeed, across processes sharing one store.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn insert(&self, grant: EmergencyGrant) -> Result<(), GrantStoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        id: GrantId,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError>;

    /// Lookup by token hash. Unscoped by tenant: redemption happens before
    /// any authenticated tenant context exists.
    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError>;

    /// Atomically set `used_at = now` iff the grant is unredeemed, unrevoked
    /// and unexpired at `now`. Returns the updated grant when this caller won
    /// the transition, `None` otherwise. Never touches `used_at` on failure.
    async fn mark_used(
        &self,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError>;

    /// Set `revoked_at` iff not already revoked. Returns the updated grant
    /// when this caller performed the transition.
    async fn mark_revoked(
        &self,
        tenant_id: TenantId,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError>;

    /// Grants whose elevation is live for this user at `now`.
    async fn in_force_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmergencyGrant>, GrantStoreError>;
}

#[async_trait]
impl<S> GrantStore for Arc<S>
where
    S: GrantStore + ?Sized,
{
    async fn insert(&self, grant: EmergencyGrant) -> Result<(), GrantStoreError> {
        (**self).insert(grant).await
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: GrantId,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        (**self).get(tenant_id, id).await
    }

    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        (**self).find_by_token_hash(hash).await
    }

    async fn mark_used(
        &self,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        (**self).mark_used(id, now).await
    }

    async fn mark_revoked(
        &self,
        tenant_id: TenantId,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        (**self).mark_revoked(tenant_id, id, now).await
    }

    async fn in_force_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmergencyGrant>, GrantStoreError> {
        (**self).in_force_for_user(tenant_id, user_id, now).await
    }
}

/// In-memory grant store.
///
/// The write lock serialises `mark_used`, which is what makes the in-memory
/// compare-and-set equivalent to the persistent store's guarded UPDATE.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<GrantId, EmergencyGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert(&self, grant: EmergencyGrant) -> Result<(), GrantStoreError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        if grants.contains_key(&grant.id) {
            return Err(GrantStoreError::Conflict(format!("grant {} exists", grant.id)));
        }
        grants.insert(grant.id, grant);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: GrantId,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(grants.get(&id).filter(|g| g.tenant_id == tenant_id).cloned())
    }

    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(grants.values().find(|g| &g.token_hash == hash).cloned())
    }

    async fn mark_used(
        &self,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        let Some(grant) = grants.get_mut(&id) else {
            return Ok(None);
        };
        if !grant.redeemable(now) {
            return Ok(None);
        }
        grant.used_at = Some(now);
        Ok(Some(grant.clone()))
    }

    async fn mark_revoked(
        &self,
        tenant_id: TenantId,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        let Some(grant) = grants.get_mut(&id) else {
            return Ok(None);
        };
        if grant.tenant_id != tenant_id || grant.revoked_at.is_some() {
            return Ok(None);
        }
        grant.revoked_at = Some(now);
        Ok(Some(grant.clone()))
    }

    async fn in_force_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmergencyGrant>, GrantStoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| GrantStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(grants
            .values()
            .filter(|g| g.tenant_id == tenant_id && g.target_user == user_id && g.in_force(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crewdesk_auth::Permission;

    fn sample(now: DateTime<Utc>, minutes: i64) -> EmergencyGrant {
        EmergencyGrant {
            id: GrantId::new(),
            tenant_id: TenantId::new(),
            target_user: UserId::new(),
            token_hash: TokenHash::of("bg_sample"),
            permissions: vec![Permission::borrowed("tickets.view_all")],
            reason: "incident".to_string(),
            granted_by: UserId::new(),
            granted_at: now,
            expires_at: now + Duration::minutes(minutes),
            used_at: None,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn mark_used_wins_once() {
        let store = InMemoryGrantStore::new();
        let now = Utc::now();
        let grant = sample(now, 10);
        store.insert(grant.clone()).await.unwrap();

        let won = store.mark_used(grant.id, now).await.unwrap();
        assert!(won.is_some());

        let lost = store.mark_used(grant.id, now).await.unwrap();
        assert!(lost.is_none());
    }

    #[tokio::test]
    async fn mark_used_refuses_expired_grants() {
        let store = InMemoryGrantStore::new();
        let now = Utc::now();
        let grant = sample(now, 1);
        store.insert(grant.clone()).await.unwrap();

        let late = now + Duration::seconds(61);
        assert!(store.mark_used(grant.id, late).await.unwrap().is_none());

        let stored = store.get(grant.tenant_id, grant.id).await.unwrap().unwrap();
        assert!(stored.used_at.is_none());
    }

    #[tokio::test]
    async fn revocation_is_single_shot_and_tenant_scoped() {
        let store = InMemoryGrantStore::new();
        let now = Utc::now();
        let grant = sample(now, 10);
        store.insert(grant.clone()).await.unwrap();

        assert!(store
            .mark_revoked(TenantId::new(), grant.id, now)
            .await
            .unwrap()
            .is_none());

        assert!(store
            .mark_revoked(grant.tenant_id, grant.id, now)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .mark_revoked(grant.tenant_id, grant.id, now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn in_force_requires_redemption() {
        let store = InMemoryGrantStore::new();
        let now = Utc::now();
        let grant = sample(now, 10);
        store.insert(grant.clone()).await.unwrap();

        assert!(store
            .in_force_for_user(grant.tenant_id, grant.target_user, now)
            .await
            .unwrap()
            .is_empty());

        store.mark_used(grant.id, now).await.unwrap();

        assert_eq!(
            store
                .in_force_for_user(grant.tenant_id, grant.target_user, now)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
