//! Redis pub/sub transport for security events.
//!
//! Redis pub/sub is not durable: a subscriber that is offline misses
//! messages. That matches the bus contract (the audit trail is the durable
//! record), so no stream or broker is involved here.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;

use crewdesk_events::{EventBus, SecurityEvent, Subscription};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(String),
    #[error("serialize error: {0}")]
    Serialize(String),
}

/// Redis pub/sub bus carrying JSON-encoded [`SecurityEvent`]s.
///
/// Through the blanket [`crewdesk_events::SecurityEventPublisher`] impl this
/// plugs straight into the emergency manager and the threat scorer.
#[derive(Debug, Clone)]
pub struct RedisSecurityEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisSecurityEventBus {
    pub fn new(
        redis_url: impl AsRef<str>,
        channel: impl Into<String>,
    ) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

impl EventBus<SecurityEvent> for RedisSecurityEventBus {
    type Error = RedisBusError;

    fn publish(&self, event: SecurityEvent) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        let _: i64 = conn
            .publish(&self.channel, payload)
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<SecurityEvent> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let channel = self.channel.clone();

        thread::spawn(move || {
            if let Err(error) = pump(&client, &channel, &tx) {
                tracing::warn!(%error, %channel, "security event subscriber stopped");
            }
        });

        Subscription::new(rx)
    }
}

/// Forward channel messages into `tx` until the connection or the receiving
/// side goes away. Malformed payloads on the channel are skipped, not fatal.
fn pump(
    client: &redis::Client,
    channel: &str,
    tx: &mpsc::Sender<SecurityEvent>,
) -> Result<(), redis::RedisError> {
    let mut conn = client.get_connection()?;
    let mut pubsub = conn.as_pubsub();
    pubsub.subscribe(channel)?;

    loop {
        let msg = pubsub.get_message()?;
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(_) => continue,
        };

        match serde_json::from_str::<SecurityEvent>(&payload) {
            Ok(event) => {
                if tx.send(event).is_err() {
                    return Ok(());
                }
            }
            Err(error) => {
                tracing::debug!(%error, %channel, "skipping undecodable security event payload");
            }
        }
    }
}
