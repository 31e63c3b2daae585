//! Security log: the durable record of suspicious/critical verdicts.

use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crewdesk_core::{SecurityLogId, TenantId, UserId};

use crate::signal::ThreatSignal;

#[derive(Debug, Error)]
pub enum SecurityLogStoreError {
    #[error("security log store unavailable: {0}")]
    Unavailable(String),
}

/// One suspicious-or-worse verdict with the signals that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLogEntry {
    pub id: SecurityLogId,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub ip: IpAddr,
    pub points: u32,
    pub signals: Vec<ThreatSignal>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SecurityLogStore: Send + Sync {
    async fn append(&self, entry: SecurityLogEntry) -> Result<(), SecurityLogStoreError>;

    /// Entries at or after `since`, newest first. Metrics surface.
    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityLogEntry>, SecurityLogStoreError>;
}

#[async_trait]
impl<S> SecurityLogStore for Arc<S>
where
    S: SecurityLogStore + ?Sized,
{
    async fn append(&self, entry: SecurityLogEntry) -> Result<(), SecurityLogStoreError> {
        (**self).append(entry).await
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityLogEntry>, SecurityLogStoreError> {
        (**self).recent(tenant_id, since).await
    }
}

/// In-memory security log.
#[derive(Debug, Default)]
pub struct InMemorySecurityLogStore {
    entries: RwLock<Vec<SecurityLogEntry>>,
}

impl InMemorySecurityLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecurityLogStore for InMemorySecurityLogStore {
    async fn append(&self, entry: SecurityLogEntry) -> Result<(), SecurityLogStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SecurityLogStoreError::Unavailable("lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityLogEntry>, SecurityLogStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SecurityLogStoreError::Unavailable("lock poisoned".to_string()))?;
        let mut hits: Vec<SecurityLogEntry> = entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.created_at >= since)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn recent_is_tenant_scoped_and_windowed() {
        let store = InMemorySecurityLogStore::new();
        let tenant = TenantId::new();
        let other = TenantId::new();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let entry = |tenant_id, created_at| SecurityLogEntry {
            id: SecurityLogId::new(),
            tenant_id,
            user_id: None,
            ip: IpAddr::from([203, 0, 113, 9]),
            points: 50,
            signals: vec![ThreatSignal::UnrecognizedIp],
            user_agent: None,
            created_at,
        };

        store.append(entry(tenant, t0)).await.unwrap();
        store
            .append(entry(tenant, t0 - chrono::Duration::hours(25)))
            .await
            .unwrap();
        store.append(entry(other, t0)).await.unwrap();

        let hits = store
            .recent(tenant, t0 - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tenant_id, tenant);
    }
}
