//! Postgres adapters for the domain store ports.
//!
//! Every query carries `tenant_id` in the WHERE clause (or is explicitly
//! documented as pre-authentication, like the token-hash lookup), so
//! cross-tenant reads are structurally impossible. Schema DDL is documented
//! on each adapter.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod audit;
pub mod directory;
pub mod grants;
pub mod security_log;

pub use audit::PostgresAuditStore;
pub use directory::PostgresDirectoryStore;
pub use grants::PostgresGrantStore;
pub use security_log::PostgresSecurityLogStore;

/// Open a connection pool sized for a stateless handler process.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// One-line description of a sqlx failure for store error payloads.
pub(crate) fn describe_sqlx_error(operation: &str, err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {operation}: {}", db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}

/// Whether the error is a unique-constraint violation (Postgres 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
