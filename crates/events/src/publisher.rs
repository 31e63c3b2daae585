//! Object-safe publishing seam for security events.

use crate::bus::EventBus;
use crate::security::SecurityEvent;

/// Best-effort, fire-and-forget publication of security events.
///
/// Business operations depend on this trait rather than on [`EventBus`]
/// directly: it is object-safe (no associated error type) and absorbs
/// transport failures, because a lost notification must never fail the
/// operation that produced it. Injected via constructors, never ambient.
pub trait SecurityEventPublisher: Send + Sync {
    fn publish(&self, event: SecurityEvent);
}

impl<B> SecurityEventPublisher for B
where
    B: EventBus<SecurityEvent>,
{
    fn publish(&self, event: SecurityEvent) {
        let label = event.kind.label();
        if let Err(error) = EventBus::publish(self, event) {
            tracing::warn!(?error, event = label, "security event publish failed; dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_bus::InMemoryEventBus;
    use crate::security::SecurityEventKind;
    use chrono::Utc;
    use crewdesk_core::TenantId;
    use std::sync::Arc;

    #[test]
    fn bus_doubles_as_publisher() {
        let bus = Arc::new(InMemoryEventBus::<SecurityEvent>::new());
        let sub = bus.subscribe();
        let publisher: Arc<dyn SecurityEventPublisher> = bus;

        publisher.publish(SecurityEvent::new(
            TenantId::new(),
            SecurityEventKind::IpBlocked {
                ip: "203.0.113.7".parse().unwrap(),
                points: 90,
                ttl_secs: 1800,
            },
            Utc::now(),
        ));

        let received = sub.try_recv().unwrap();
        assert_eq!(received.kind.label(), "security.ip_blocked");
    }
}
