//! `crewdesk-events` — event bus contract and the security event model.

pub mod bus;
pub mod in_memory_bus;
pub mod publisher;
pub mod security;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use publisher::SecurityEventPublisher;
pub use security::{SecurityEvent, SecurityEventKind, Severity};
