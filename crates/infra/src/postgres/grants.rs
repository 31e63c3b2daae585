//! Postgres-backed emergency grant store.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE emergency_access (
//!     id          UUID PRIMARY KEY,
//!     tenant_id   UUID NOT NULL,
//!     target_user UUID NOT NULL,
//!     token_hash  TEXT NOT NULL UNIQUE,
//!     permissions JSONB NOT NULL,
//!     reason      TEXT NOT NULL,
//!     granted_by  UUID NOT NULL,
//!     granted_at  TIMESTAMPTZ NOT NULL,
//!     expires_at  TIMESTAMPTZ NOT NULL,
//!     used_at     TIMESTAMPTZ,
//!     revoked_at  TIMESTAMPTZ
//! );
//! CREATE INDEX emergency_access_live_idx
//!     ON emergency_access (tenant_id, target_user, expires_at);
//! ```
//!
//! Redemption atomicity lives in the `mark_used` UPDATE: the guarded
//! `WHERE used_at IS NULL AND revoked_at IS NULL AND expires_at > $2` makes
//! Postgres arbitrate concurrent redemptions; exactly one statement matches
//! the row, everyone else updates nothing. No advisory locks, no
//! SELECT-then-UPDATE window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use crewdesk_core::{GrantId, TenantId, UserId};
use crewdesk_emergency::{EmergencyGrant, GrantStore, GrantStoreError, TokenHash};

use super::{describe_sqlx_error, is_unique_violation};

const GRANT_COLUMNS: &str = "id, tenant_id, target_user, token_hash, permissions, reason, \
     granted_by, granted_at, expires_at, used_at, revoked_at";

#[derive(Debug, Clone)]
pub struct PostgresGrantStore {
    pool: PgPool,
}

impl PostgresGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> GrantStoreError {
    GrantStoreError::Unavailable(describe_sqlx_error(operation, &err))
}

fn row_to_grant(row: &PgRow) -> Result<EmergencyGrant, GrantStoreError> {
    let get = |e: sqlx::Error| GrantStoreError::Unavailable(format!("grant row decode: {e}"));

    let permissions_json: serde_json::Value = row.try_get("permissions").map_err(get)?;
    let permissions = serde_json::from_value(permissions_json)
        .map_err(|e| GrantStoreError::Unavailable(format!("grant permissions decode: {e}")))?;

    Ok(EmergencyGrant {
        id: GrantId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        target_user: UserId::from_uuid(row.try_get::<Uuid, _>("target_user").map_err(get)?),
        token_hash: TokenHash::from_stored(row.try_get::<String, _>("token_hash").map_err(get)?),
        permissions,
        reason: row.try_get("reason").map_err(get)?,
        granted_by: UserId::from_uuid(row.try_get::<Uuid, _>("granted_by").map_err(get)?),
        granted_at: row.try_get("granted_at").map_err(get)?,
        expires_at: row.try_get("expires_at").map_err(get)?,
        used_at: row.try_get("used_at").map_err(get)?,
        revoked_at: row.try_get("revoked_at").map_err(get)?,
    })
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    #[instrument(skip(self, grant), fields(grant_id = %grant.id, tenant_id = %grant.tenant_id), err)]
    async fn insert(&self, grant: EmergencyGrant) -> Result<(), GrantStoreError> {
        let permissions = serde_json::to_value(&grant.permissions)
            .map_err(|e| GrantStoreError::Unavailable(format!("grant permissions encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO emergency_access (
                id, tenant_id, target_user, token_hash, permissions, reason,
                granted_by, granted_at, expires_at, used_at, revoked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(grant.id.as_uuid())
        .bind(grant.tenant_id.as_uuid())
        .bind(grant.target_user.as_uuid())
        .bind(grant.token_hash.as_str())
        .bind(permissions)
        .bind(&grant.reason)
        .bind(grant.granted_by.as_uuid())
        .bind(grant.granted_at)
        .bind(grant.expires_at)
        .bind(grant.used_at)
        .bind(grant.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GrantStoreError::Conflict("duplicate grant id or token hash".to_string())
            } else {
                unavailable("insert_grant", e)
            }
        })?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: GrantId,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {GRANT_COLUMNS} FROM emergency_access WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("get_grant", e))?;

        row.as_ref().map(row_to_grant).transpose()
    }

    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {GRANT_COLUMNS} FROM emergency_access WHERE token_hash = $1"
        ))
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("find_by_token_hash", e))?;

        row.as_ref().map(row_to_grant).transpose()
    }

    #[instrument(skip(self), fields(grant_id = %id), err)]
    async fn mark_used(
        &self,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE emergency_access
            SET used_at = $2
            WHERE id = $1
              AND used_at IS NULL
              AND revoked_at IS NULL
              AND expires_at > $2
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("mark_used", e))?;

        row.as_ref().map(row_to_grant).transpose()
    }

    #[instrument(skip(self), fields(grant_id = %id, tenant_id = %tenant_id), err)]
    async fn mark_revoked(
        &self,
        tenant_id: TenantId,
        id: GrantId,
        now: DateTime<Utc>,
    ) -> Result<Option<EmergencyGrant>, GrantStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE emergency_access
            SET revoked_at = $3
            WHERE tenant_id = $1 AND id = $2 AND revoked_at IS NULL
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("mark_revoked", e))?;

        row.as_ref().map(row_to_grant).transpose()
    }

    async fn in_force_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmergencyGrant>, GrantStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM emergency_access
            WHERE tenant_id = $1
              AND target_user = $2
              AND used_at IS NOT NULL
              AND revoked_at IS NULL
              AND expires_at > $3
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("in_force_for_user", e))?;

        rows.iter().map(row_to_grant).collect()
    }
}
