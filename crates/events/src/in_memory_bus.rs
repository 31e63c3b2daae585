//! Process-local bus over std channels: the default transport for tests and
//! single-node deployments.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// The subscriber table lock was poisoned by a panicking publisher.
    #[error("event bus subscriber table poisoned")]
    Poisoned,
}

/// Broadcast bus backed by one std mpsc channel per subscriber.
///
/// Fan-out is best-effort: a subscriber that has been dropped is pruned on
/// the next publish rather than eagerly. No IO, no async; cheap enough that
/// the hot security path can publish without batching.
#[derive(Debug)]
pub struct InMemoryEventBus<E> {
    outlets: Mutex<Vec<mpsc::Sender<E>>>,
}

impl<E> InMemoryEventBus<E> {
    pub fn new() -> Self {
        Self {
            outlets: Mutex::new(Vec::new()),
        }
    }
}

impl<E> Default for InMemoryEventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> for InMemoryEventBus<E>
where
    E: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, event: E) -> Result<(), Self::Error> {
        let mut outlets = self.outlets.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        match outlets.len() {
            0 => {}
            // Skip the clone when there is exactly one live subscriber.
            1 => {
                if outlets[0].send(event).is_err() {
                    outlets.clear();
                }
            }
            _ => outlets.retain(|tx| tx.send(event.clone()).is_ok()),
        }

        Ok(())
    }

    fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::channel();

        // A poisoned table yields a subscription that never fires; publishers
        // already surface the poisoning as an error.
        if let Ok(mut outlets) = self.outlets.lock() {
            outlets.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_message() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();
        bus.publish(9).unwrap();

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(a.try_recv().unwrap(), 9);
        assert_eq!(b.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 9);
    }

    #[test]
    fn dropped_subscribers_do_not_break_publishing() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1).unwrap();

        assert_eq!(keep.try_recv().unwrap(), 1);
    }

    #[test]
    fn sole_dropped_subscriber_is_pruned() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        drop(bus.subscribe());

        bus.publish(1).unwrap();

        let late = bus.subscribe();
        bus.publish(2).unwrap();
        assert_eq!(late.try_recv().unwrap(), 2);
    }
}
