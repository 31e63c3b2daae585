//! Postgres-backed security log store.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE security_logs (
//!     id         UUID PRIMARY KEY,
//!     tenant_id  UUID NOT NULL,
//!     user_id    UUID,
//!     ip         TEXT NOT NULL,
//!     points     INTEGER NOT NULL,
//!     signals    JSONB NOT NULL,
//!     user_agent TEXT,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX security_logs_recent_idx ON security_logs (tenant_id, created_at);
//! ```

use core::str::FromStr;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use crewdesk_core::{SecurityLogId, TenantId, UserId};
use crewdesk_threat::{SecurityLogEntry, SecurityLogStore, SecurityLogStoreError};

use super::describe_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresSecurityLogStore {
    pool: PgPool,
}

impl PostgresSecurityLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> SecurityLogStoreError {
    SecurityLogStoreError::Unavailable(describe_sqlx_error(operation, &err))
}

fn row_to_entry(row: &PgRow) -> Result<SecurityLogEntry, SecurityLogStoreError> {
    let get =
        |e: sqlx::Error| SecurityLogStoreError::Unavailable(format!("security log decode: {e}"));

    let ip_raw: String = row.try_get("ip").map_err(get)?;
    let ip = IpAddr::from_str(&ip_raw)
        .map_err(|e| SecurityLogStoreError::Unavailable(format!("security log ip: {e}")))?;

    let points: i32 = row.try_get("points").map_err(get)?;

    let signals_json: serde_json::Value = row.try_get("signals").map_err(get)?;
    let signals = serde_json::from_value(signals_json)
        .map_err(|e| SecurityLogStoreError::Unavailable(format!("security log signals: {e}")))?;

    Ok(SecurityLogEntry {
        id: SecurityLogId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")
            .map_err(get)?
            .map(UserId::from_uuid),
        ip,
        points: u32::try_from(points).unwrap_or(0),
        signals,
        user_agent: row.try_get("user_agent").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

#[async_trait]
impl SecurityLogStore for PostgresSecurityLogStore {
    #[instrument(skip(self, entry), fields(tenant_id = %entry.tenant_id, points = entry.points), err)]
    async fn append(&self, entry: SecurityLogEntry) -> Result<(), SecurityLogStoreError> {
        let signals = serde_json::to_value(&entry.signals)
            .map_err(|e| SecurityLogStoreError::Unavailable(format!("signals encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO security_logs (
                id, tenant_id, user_id, ip, points, signals, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.tenant_id.as_uuid())
        .bind(entry.user_id.map(|u| *u.as_uuid()))
        .bind(entry.ip.to_string())
        .bind(i32::try_from(entry.points).unwrap_or(i32::MAX))
        .bind(signals)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("append_security_log", e))?;

        Ok(())
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SecurityLogEntry>, SecurityLogStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, ip, points, signals, user_agent, created_at
            FROM security_logs
            WHERE tenant_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("security_log_recent", e))?;

        rows.iter().map(row_to_entry).collect()
    }
}
