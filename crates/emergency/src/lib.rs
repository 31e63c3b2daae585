//! `crewdesk-emergency` — break-glass access for incident response.
//!
//! A grant is a time-boxed permission elevation unlocked by a single-use
//! token. Only the token's SHA-256 hash is ever stored; redemption is an
//! atomic compare-and-set so two presentations of the same token can never
//! both succeed. Every transition in the lifecycle is audited.

pub mod grant;
pub mod manager;
pub mod store;
pub mod token;

pub use grant::{EmergencyGrant, GrantStatus};
pub use manager::{
    EmergencyAccessManager, EmergencyConfig, EmergencyError, IssueCommand, IssuedGrant,
};
pub use store::{GrantStore, GrantStoreError, InMemoryGrantStore};
pub use token::{BreakGlassToken, TokenHash};
