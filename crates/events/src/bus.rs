//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the hand-off point between the access-control core and whatever
//! consumes security events (notification fan-out, SIEM forwarders, test
//! probes). Delivery of notifications themselves happens outside this core.
//!
//! The contract is intentionally **lightweight**:
//!
//! - **Transport-agnostic**: works with in-memory channels, Redis pub/sub, etc.
//! - **At-least-once delivery**: consumers must tolerate duplicates
//! - **No persistence**: the audit trail is the durable record; the bus only
//!   distributes. A dropped security event loses a notification, never a fact.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, TryRecvError};

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail (bus full, transport error). Callers on the security
/// path treat a failed publish as a degraded notification, not a failed
/// operation: the decision and its audit record have already been made.
pub trait EventBus<E>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, event: E) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<E>;
}

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every event published to the bus
/// (broadcast semantics). Subscriptions are designed for single-threaded
/// consumption; share one across threads only behind your own channel.
#[derive(Debug)]
pub struct Subscription<E> {
    receiver: Receiver<E>,
}

impl<E> Subscription<E> {
    pub fn new(receiver: Receiver<E>) -> Self {
        Self { receiver }
    }

    /// Block until the next event is available.
    pub fn recv(&self) -> Result<E, RecvError> {
        self.receiver.recv()
    }

    /// Receive the next event if one is already queued.
    pub fn try_recv(&self) -> Result<E, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<E, B> EventBus<E> for Arc<B>
where
    B: EventBus<E> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, event: E) -> Result<(), Self::Error> {
        (**self).publish(event)
    }

    fn subscribe(&self) -> Subscription<E> {
        (**self).subscribe()
    }
}
