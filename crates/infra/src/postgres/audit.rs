//! Postgres-backed audit store.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE permission_audits (
//!     id           UUID PRIMARY KEY,
//!     tenant_id    UUID NOT NULL,
//!     action       TEXT NOT NULL,
//!     user_id      UUID,
//!     performed_by UUID,
//!     permission   TEXT,
//!     grant_id     UUID,
//!     ip           TEXT,
//!     reason       TEXT,
//!     old_values   JSONB,
//!     new_values   JSONB,
//!     created_at   TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX permission_audits_grant_idx ON permission_audits (tenant_id, grant_id);
//! CREATE INDEX permission_audits_user_idx ON permission_audits (tenant_id, user_id, created_at);
//! ```
//!
//! Append-only by construction: this adapter issues INSERT, SELECT and the
//! retention DELETE, nothing else. `ip` is TEXT rather than INET so the
//! column can never reject a record over address formatting.

use core::str::FromStr;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use crewdesk_audit::{AuditAction, AuditRecord, AuditStore, AuditStoreError};
use crewdesk_core::{AuditRecordId, GrantId, TenantId, UserId};

use super::describe_sqlx_error;

const AUDIT_COLUMNS: &str = "id, tenant_id, action, user_id, performed_by, permission, \
     grant_id, ip, reason, old_values, new_values, created_at";

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> AuditStoreError {
    AuditStoreError::Unavailable(describe_sqlx_error(operation, &err))
}

fn row_to_record(row: &PgRow) -> Result<AuditRecord, AuditStoreError> {
    let get = |e: sqlx::Error| AuditStoreError::Serialization(format!("audit row decode: {e}"));

    let action: String = row.try_get("action").map_err(get)?;
    let action = AuditAction::from_str(&action)
        .map_err(|e| AuditStoreError::Serialization(e.to_string()))?;

    let ip: Option<String> = row.try_get("ip").map_err(get)?;
    let ip = ip
        .map(|raw| {
            IpAddr::from_str(&raw)
                .map_err(|e| AuditStoreError::Serialization(format!("audit ip decode: {e}")))
        })
        .transpose()?;

    Ok(AuditRecord {
        id: AuditRecordId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        action,
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")
            .map_err(get)?
            .map(UserId::from_uuid),
        performed_by: row
            .try_get::<Option<Uuid>, _>("performed_by")
            .map_err(get)?
            .map(UserId::from_uuid),
        permission: row.try_get("permission").map_err(get)?,
        grant_id: row
            .try_get::<Option<Uuid>, _>("grant_id")
            .map_err(get)?
            .map(GrantId::from_uuid),
        ip,
        reason: row.try_get("reason").map_err(get)?,
        old_values: row.try_get("old_values").map_err(get)?,
        new_values: row.try_get("new_values").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip(self, record), fields(action = record.action.as_str(), tenant_id = %record.tenant_id), err)]
    async fn append(&self, record: AuditRecord) -> Result<(), AuditStoreError> {
        sqlx::query(
            r#"
            INSERT INTO permission_audits (
                id, tenant_id, action, user_id, performed_by, permission,
                grant_id, ip, reason, old_values, new_values, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.action.as_str())
        .bind(record.user_id.map(|u| *u.as_uuid()))
        .bind(record.performed_by.map(|u| *u.as_uuid()))
        .bind(&record.permission)
        .bind(record.grant_id.map(|g| *g.as_uuid()))
        .bind(record.ip.map(|ip| ip.to_string()))
        .bind(&record.reason)
        .bind(&record.old_values)
        .bind(&record.new_values)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("append_audit", e))?;

        Ok(())
    }

    async fn for_grant(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS}
            FROM permission_audits
            WHERE tenant_id = $1 AND grant_id = $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(grant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("audit_for_grant", e))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS}
            FROM permission_audits
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("audit_for_user", e))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS}
            FROM permission_audits
            WHERE tenant_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("audit_recent", e))?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip(self), fields(cutoff = %cutoff), err)]
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError> {
        let result = sqlx::query("DELETE FROM permission_audits WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable("audit_purge", e))?;

        Ok(result.rows_affected())
    }
}
