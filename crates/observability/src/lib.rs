//! `crewdesk-observability` — shared tracing/logging setup.
//!
//! Security decisions are only reviewable if their log lines are, so every
//! binary and integration test goes through [`init`] rather than configuring
//! subscribers ad hoc.

pub mod tracing;

/// Initialize process-wide observability.
///
/// Safe to call multiple times; subsequent calls become no-ops, which lets
/// each integration test call it without coordination.
pub fn init() {
    tracing::init();
}
