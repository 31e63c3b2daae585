//! Fail-open audit recording.

use std::sync::Arc;

use crewdesk_core::{AuditRecordId, Clock};

use crate::record::AuditDraft;
use crate::store::AuditStore;

/// Records audit drafts without ever failing the calling operation.
///
/// A denial or a break-glass redemption must not bounce because the audit
/// store hiccuped. `record` retries a failed append exactly once, then logs
/// at error level and drops the record. Callers get no error channel at all;
/// the signature is the contract.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Stamp and persist a draft. Infallible from the caller's view.
    pub async fn record(&self, draft: AuditDraft) {
        let record = draft.into_record(AuditRecordId::new(), self.clock.now());
        let action = record.action.as_str();

        if let Err(first) = self.store.append(record.clone()).await {
            tracing::warn!(error = %first, action, "audit append failed; retrying once");
            if let Err(second) = self.store.append(record).await {
                tracing::error!(error = %second, action, "audit record dropped after retry");
            }
        }
    }
}
