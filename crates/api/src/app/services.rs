//! Store wiring and shared application state.
//!
//! One `AppServices` is built at startup and shared behind an `Arc`. The
//! in-memory wiring serves dev and tests; `USE_PERSISTENT_STORES=true` with
//! the `redis` feature switches to Postgres + Redis adapters with identical
//! semantics.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use uuid::Uuid;

use crewdesk_audit::{AuditSink, AuditStore, InMemoryAuditStore};
use crewdesk_auth::{DirectoryStore, InMemoryDirectory};
use crewdesk_core::{Clock, SystemClock, TenantId};
use crewdesk_emergency::{EmergencyAccessManager, GrantStore, InMemoryGrantStore};
use crewdesk_events::{
    EventBus, InMemoryEventBus, SecurityEvent, SecurityEventPublisher, Subscription,
};
use crewdesk_threat::{
    BlockStore, CounterStore, InMemoryBlockStore, InMemoryCounterStore, InMemorySecurityLogStore,
    SecurityLogStore, ThreatScorer,
};

#[cfg(feature = "redis")]
use crewdesk_infra::{
    PostgresAuditStore, PostgresDirectoryStore, PostgresGrantStore, PostgresSecurityLogStore,
    RedisBlockStore, RedisCounterStore, RedisSecurityEventBus,
};

use crate::app::config::AppConfig;

#[cfg(feature = "redis")]
const SECURITY_EVENT_CHANNEL: &str = "crewdesk.security";

const AUDIT_PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tenant id used for scoring traffic that has not authenticated yet.
///
/// Pre-auth activity is platform-scoped, not tenant-scoped; the nil UUID
/// keeps those counters and log rows in one well-known place.
pub fn edge_tenant() -> TenantId {
    TenantId::from_uuid(Uuid::nil())
}

/// Shared application state: configuration, the injected clock, the store
/// ports the handlers read from, and the two decision services.
pub struct AppServices {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<dyn DirectoryStore>,
    pub audit_store: Arc<dyn AuditStore>,
    pub audit: AuditSink,
    pub blocks: Arc<dyn BlockStore>,
    pub security_log: Arc<dyn SecurityLogStore>,
    pub emergency: EmergencyAccessManager,
    pub scorer: ThreatScorer,
    /// Lossy fan-out of security events for SSE subscribers.
    pub realtime_tx: broadcast::Sender<SecurityEvent>,
}

pub async fn build_services(config: AppConfig) -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
            return build_in_memory_services(config);
        }
    }

    build_in_memory_services(config)
}

/// Concrete in-memory stores, kept un-erased so tests can seed and inspect
/// them after handing clones to `build_with_stores`.
#[derive(Clone)]
pub struct InMemoryStores {
    pub directory: Arc<InMemoryDirectory>,
    pub grants: Arc<InMemoryGrantStore>,
    pub audit: Arc<InMemoryAuditStore>,
    pub counters: Arc<InMemoryCounterStore>,
    pub blocks: Arc<InMemoryBlockStore>,
    pub security_log: Arc<InMemorySecurityLogStore>,
    pub bus: Arc<InMemoryEventBus<SecurityEvent>>,
}

impl InMemoryStores {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new()),
            grants: Arc::new(InMemoryGrantStore::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
            counters: Arc::new(InMemoryCounterStore::new(clock)),
            blocks: Arc::new(InMemoryBlockStore::new()),
            security_log: Arc::new(InMemorySecurityLogStore::new()),
            bus: Arc::new(InMemoryEventBus::new()),
        }
    }
}

pub fn build_in_memory_services(config: AppConfig) -> AppServices {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = InMemoryStores::new(clock.clone());
    build_with_stores(config, clock, &stores)
}

/// Wire services over caller-owned in-memory stores (test seam).
pub fn build_with_stores(
    config: AppConfig,
    clock: Arc<dyn Clock>,
    stores: &InMemoryStores,
) -> AppServices {
    let subscription = stores.bus.subscribe();

    let ports = StorePorts {
        directory: stores.directory.clone(),
        grants: stores.grants.clone(),
        audit: stores.audit.clone(),
        counters: stores.counters.clone(),
        blocks: stores.blocks.clone(),
        security_log: stores.security_log.clone(),
        events: stores.bus.clone(),
    };

    assemble(config, clock, ports, subscription)
}

#[cfg(feature = "redis")]
pub async fn build_persistent_services(config: AppConfig) -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let pool = crewdesk_infra::connect(&database_url)
        .await
        .expect("failed to connect to postgres");

    let directory = Arc::new(PostgresDirectoryStore::new(pool.clone()));
    let grants = Arc::new(PostgresGrantStore::new(pool.clone()));
    let audit_store = Arc::new(PostgresAuditStore::new(pool.clone()));
    let security_log = Arc::new(PostgresSecurityLogStore::new(pool));

    let counters = Arc::new(
        RedisCounterStore::connect(&redis_url)
            .await
            .expect("failed to connect to redis (counters)"),
    );
    let blocks = Arc::new(
        RedisBlockStore::connect(&redis_url)
            .await
            .expect("failed to connect to redis (blocklist)"),
    );

    let bus = Arc::new(
        RedisSecurityEventBus::new(&redis_url, SECURITY_EVENT_CHANNEL)
            .expect("failed to open redis event bus"),
    );
    let subscription = bus.subscribe();

    let ports = StorePorts {
        directory,
        grants,
        audit: audit_store,
        counters,
        blocks,
        security_log,
        events: bus,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    assemble(config, clock, ports, subscription)
}

/// Type-erased store handles, bundled so wiring reads the same for both
/// backends.
struct StorePorts {
    directory: Arc<dyn DirectoryStore>,
    grants: Arc<dyn GrantStore>,
    audit: Arc<dyn AuditStore>,
    counters: Arc<dyn CounterStore>,
    blocks: Arc<dyn BlockStore>,
    security_log: Arc<dyn SecurityLogStore>,
    events: Arc<dyn SecurityEventPublisher>,
}

fn assemble(
    config: AppConfig,
    clock: Arc<dyn Clock>,
    ports: StorePorts,
    subscription: Subscription<SecurityEvent>,
) -> AppServices {
    let StorePorts {
        directory,
        grants,
        audit: audit_store,
        counters,
        blocks,
        security_log,
        events,
    } = ports;

    let audit = AuditSink::new(audit_store.clone(), clock.clone());

    let emergency = EmergencyAccessManager::new(
        grants,
        audit.clone(),
        audit_store.clone(),
        events.clone(),
        clock.clone(),
        config.emergency,
    );

    let scorer = ThreatScorer::new(
        counters,
        blocks.clone(),
        security_log.clone(),
        audit.clone(),
        events,
        clock.clone(),
        config.threat,
    );

    // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<SecurityEvent>(256);
    spawn_event_forwarder(subscription, realtime_tx.clone());

    spawn_audit_retention(audit_store.clone(), clock.clone(), config.audit_retention_days);

    AppServices {
        config,
        clock,
        directory,
        audit_store,
        audit,
        blocks,
        security_log,
        emergency,
        scorer,
        realtime_tx,
    }
}

/// Background forwarder: bus subscription -> broadcast channel.
///
/// Subscriptions block on `recv`, so this runs on the blocking pool. The
/// loop ends when the bus side hangs up.
fn spawn_event_forwarder(
    subscription: Subscription<SecurityEvent>,
    realtime_tx: broadcast::Sender<SecurityEvent>,
) {
    tokio::task::spawn_blocking(move || {
        loop {
            match subscription.recv() {
                Ok(event) => {
                    // Lossy by contract; the audit trail is the durable record.
                    let _ = realtime_tx.send(event);
                }
                Err(_) => break,
            }
        }
    });
}

/// Daily purge of audit records past the retention horizon. First pass runs
/// at startup.
fn spawn_audit_retention(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>, retention_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUDIT_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = clock.now() - chrono::Duration::days(i64::from(retention_days));
            match store.purge_older_than(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "expired audit records purged"),
                Err(error) => tracing::warn!(%error, "audit retention purge failed"),
            }
        }
    });
}

/// Build a tenant-filtered SSE stream of security events (used by
/// `/admin/security/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |event| match event {
        Ok(ev) if ev.tenant_id == tenant_id => {
            let data = serde_json::to_string(&ev).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(ev.kind.label()).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
