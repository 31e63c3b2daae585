//! `crewdesk-auth` — pure authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: evaluation is
//! a pure function over a [`RoleGraph`] snapshot and a [`ResolvedPrincipal`],
//! and the [`DirectoryStore`] port is the only seam to persistence.

pub mod claims;
pub mod department;
pub mod directory;
pub mod evaluate;
pub mod graph;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use claims::{JwtClaims, TokenValidationError};
pub use department::Department;
pub use directory::{DirectoryError, DirectoryStore, InMemoryDirectory, UserEntry};
pub use evaluate::{AccessDecision, AccessScope, DecisionBasis, can_act_on, evaluate};
pub use graph::{EffectivePermissions, RoleGraph};
pub use permissions::{Permission, PermissionDef, well_known};
pub use principal::{ActiveGrant, ResolvedPrincipal};
pub use roles::{Role, RoleAssignment};
