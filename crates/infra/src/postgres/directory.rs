//! Postgres-backed directory (users, roles, permission catalog, departments).
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE users (
//!     id            UUID PRIMARY KEY,
//!     tenant_id     UUID NOT NULL,
//!     department_id UUID,
//!     display_name  TEXT NOT NULL
//! );
//! CREATE TABLE roles (
//!     id              UUID PRIMARY KEY,
//!     tenant_id       UUID NOT NULL,
//!     name            TEXT NOT NULL,
//!     hierarchy_level SMALLINT NOT NULL,
//!     permissions     JSONB NOT NULL,
//!     active          BOOLEAN NOT NULL DEFAULT TRUE
//! );
//! CREATE TABLE permissions (
//!     tenant_id          UUID NOT NULL,
//!     name               TEXT NOT NULL,
//!     resource           TEXT NOT NULL,
//!     action             TEXT NOT NULL,
//!     department_scoped  BOOLEAN NOT NULL,
//!     global_variant     TEXT,
//!     active             BOOLEAN NOT NULL DEFAULT TRUE,
//!     PRIMARY KEY (tenant_id, name)
//! );
//! CREATE TABLE departments (
//!     id        UUID PRIMARY KEY,
//!     tenant_id UUID NOT NULL,
//!     name      TEXT NOT NULL,
//!     parent_id UUID REFERENCES departments (id),
//!     path      TEXT NOT NULL
//! );
//! CREATE TABLE role_assignments (
//!     tenant_id  UUID NOT NULL,
//!     user_id    UUID NOT NULL,
//!     role_id    UUID NOT NULL REFERENCES roles (id),
//!     granted_by UUID NOT NULL,
//!     granted_at TIMESTAMPTZ NOT NULL,
//!     expires_at TIMESTAMPTZ,
//!     is_active  BOOLEAN NOT NULL DEFAULT TRUE
//! );
//! ```
//!
//! `role_graph` loads the whole tenant catalog in three queries and hands
//! evaluation an immutable snapshot, so one request always decides against
//! one consistent view of the directory.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use crewdesk_auth::{
    Department, DirectoryError, DirectoryStore, Permission, PermissionDef, Role, RoleAssignment,
    RoleGraph, UserEntry,
};
use crewdesk_core::{DepartmentId, RoleId, TenantId, UserId};

use super::describe_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresDirectoryStore {
    pool: PgPool,
}

impl PostgresDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> DirectoryError {
    DirectoryError::Unavailable(describe_sqlx_error(operation, &err))
}

fn inconsistent(what: &str, detail: impl core::fmt::Display) -> DirectoryError {
    DirectoryError::Inconsistent(format!("{what}: {detail}"))
}

fn row_to_role(row: &PgRow) -> Result<Role, DirectoryError> {
    let get = |e: sqlx::Error| inconsistent("role row", e);

    let level: i16 = row.try_get("hierarchy_level").map_err(get)?;
    let hierarchy_level =
        u8::try_from(level).map_err(|_| inconsistent("role hierarchy_level", level))?;

    let permissions_json: serde_json::Value = row.try_get("permissions").map_err(get)?;
    let permissions: Vec<Permission> = serde_json::from_value(permissions_json)
        .map_err(|e| inconsistent("role permissions", e))?;

    Ok(Role {
        id: RoleId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        hierarchy_level,
        permissions,
        active: row.try_get("active").map_err(get)?,
    })
}

fn row_to_permission_def(row: &PgRow) -> Result<PermissionDef, DirectoryError> {
    let get = |e: sqlx::Error| inconsistent("permission row", e);

    Ok(PermissionDef {
        name: Permission::from(row.try_get::<String, _>("name").map_err(get)?),
        resource: row.try_get("resource").map_err(get)?,
        action: row.try_get("action").map_err(get)?,
        department_scoped: row.try_get("department_scoped").map_err(get)?,
        global_variant: row
            .try_get::<Option<String>, _>("global_variant")
            .map_err(get)?
            .map(Permission::from),
        active: row.try_get("active").map_err(get)?,
    })
}

fn row_to_department(row: &PgRow) -> Result<Department, DirectoryError> {
    let get = |e: sqlx::Error| inconsistent("department row", e);

    Ok(Department {
        id: DepartmentId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .map_err(get)?
            .map(DepartmentId::from_uuid),
        path: row.try_get("path").map_err(get)?,
    })
}

fn row_to_assignment(row: &PgRow) -> Result<RoleAssignment, DirectoryError> {
    let get = |e: sqlx::Error| inconsistent("role assignment row", e);

    Ok(RoleAssignment {
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(get)?),
        role_id: RoleId::from_uuid(row.try_get::<Uuid, _>("role_id").map_err(get)?),
        granted_by: UserId::from_uuid(row.try_get::<Uuid, _>("granted_by").map_err(get)?),
        granted_at: row.try_get("granted_at").map_err(get)?,
        expires_at: row.try_get("expires_at").map_err(get)?,
        is_active: row.try_get("is_active").map_err(get)?,
    })
}

#[async_trait]
impl DirectoryStore for PostgresDirectoryStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn role_graph(&self, tenant_id: TenantId) -> Result<RoleGraph, DirectoryError> {
        let role_rows = sqlx::query(
            "SELECT id, tenant_id, name, hierarchy_level, permissions, active \
             FROM roles WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("load_roles", e))?;

        let permission_rows = sqlx::query(
            "SELECT name, resource, action, department_scoped, global_variant, active \
             FROM permissions WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("load_permissions", e))?;

        let department_rows = sqlx::query(
            "SELECT id, tenant_id, name, parent_id, path \
             FROM departments WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("load_departments", e))?;

        let roles: Vec<Role> = role_rows.iter().map(row_to_role).collect::<Result<_, _>>()?;
        let permissions: Vec<PermissionDef> = permission_rows
            .iter()
            .map(row_to_permission_def)
            .collect::<Result<_, _>>()?;
        let departments: Vec<Department> = department_rows
            .iter()
            .map(row_to_department)
            .collect::<Result<_, _>>()?;

        Ok(RoleGraph::new(roles, permissions, departments))
    }

    async fn user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserEntry>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, department_id, display_name \
             FROM users WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("load_user", e))?;

        row.map(|row| {
            let get = |e: sqlx::Error| inconsistent("user row", e);
            Ok(UserEntry {
                user_id: UserId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
                tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
                department_id: row
                    .try_get::<Option<Uuid>, _>("department_id")
                    .map_err(get)?
                    .map(DepartmentId::from_uuid),
                display_name: row.try_get("display_name").map_err(get)?,
            })
        })
        .transpose()
    }

    async fn assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleAssignment>, DirectoryError> {
        let rows = sqlx::query(
            "SELECT user_id, role_id, granted_by, granted_at, expires_at, is_active \
             FROM role_assignments WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("load_assignments", e))?;

        rows.iter().map(row_to_assignment).collect()
    }
}
