use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_core::{DepartmentId, GrantId, UserId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IssueBreakGlassRequest {
    pub user_id: UserId,
    pub permissions: Vec<String>,
    pub reason: String,
    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessCheckRequest {
    pub permission: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct IssueBreakGlassResponse {
    pub emergency_access_id: GrantId,
    /// Plaintext break-glass token. Shown exactly once; only its hash is
    /// stored.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub success: bool,
    pub user_id: UserId,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub session_token: String,
}

/// Deliberately a single field: callers learn the outcome, never the basis.
#[derive(Debug, Serialize)]
pub struct AccessCheckResponse {
    pub allowed: bool,
}
