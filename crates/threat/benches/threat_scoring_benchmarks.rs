use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{DateTime, TimeZone, Utc};
use crewdesk_audit::{AuditSink, InMemoryAuditStore};
use crewdesk_core::{Clock, FixedClock, TenantId, UserId};
use crewdesk_events::{InMemoryEventBus, SecurityEvent};
use crewdesk_threat::{
    BlockStore, InMemoryBlockStore, InMemoryCounterStore, InMemorySecurityLogStore, RequestContext,
    ThreatConfig, ThreatScorer,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

/// Distinct addresses for warming the block table.
fn nth_ip(n: u32) -> IpAddr {
    IpAddr::from([10, (n >> 16) as u8, (n >> 8) as u8, n as u8])
}

fn warm_blocks(rt: &Runtime, blocks: &InMemoryBlockStore, size: u32, now: DateTime<Utc>) {
    rt.block_on(async {
        for i in 0..size {
            blocks
                .block(nth_ip(i), Duration::from_secs(1800), "bench load", now)
                .await
                .unwrap();
        }
    });
}

fn setup_scorer() -> (ThreatScorer, Arc<InMemoryBlockStore>, FixedClock, TenantId) {
    let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
    let blocks = Arc::new(InMemoryBlockStore::new());
    let log = Arc::new(InMemorySecurityLogStore::new());
    let audit = AuditSink::new(Arc::new(InMemoryAuditStore::new()), Arc::new(clock.clone()));
    let bus: Arc<InMemoryEventBus<SecurityEvent>> = Arc::new(InMemoryEventBus::new());

    let scorer = ThreatScorer::new(
        counters,
        blocks.clone(),
        log,
        audit,
        bus,
        Arc::new(clock.clone()),
        ThreatConfig::default(),
    );
    (scorer, blocks, clock, TenantId::new())
}

fn bench_block_lookup(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("block_lookup");
    group.throughput(Throughput::Elements(1));

    for table_size in [1u32, 100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("hit", table_size), table_size, |b, &size| {
            let blocks = InMemoryBlockStore::new();
            let now = Utc::now();
            warm_blocks(&rt, &blocks, size, now);
            let probe = nth_ip(size / 2);

            b.iter(|| {
                let hit = rt.block_on(blocks.is_blocked(black_box(probe), now)).unwrap();
                black_box(hit);
            });
        });

        group.bench_with_input(
            BenchmarkId::new("miss", table_size),
            table_size,
            |b, &size| {
                let blocks = InMemoryBlockStore::new();
                let now = Utc::now();
                warm_blocks(&rt, &blocks, size, now);
                let probe = IpAddr::from([198, 51, 100, 1]);

                b.iter(|| {
                    let hit = rt.block_on(blocks.is_blocked(black_box(probe), now)).unwrap();
                    black_box(hit);
                });
            },
        );
    }

    group.finish();
}

fn bench_assess(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("assess_latency");
    group.sample_size(1000);

    // Anonymous probe with no history: the pre-authentication admission shape.
    group.bench_function("anonymous_no_history", |b| {
        let (scorer, _, _, tenant) = setup_scorer();
        let ctx = RequestContext::new(tenant, IpAddr::from([203, 0, 113, 10]));

        b.iter(|| {
            black_box(rt.block_on(scorer.assess(black_box(&ctx))));
        });
    });

    // Recognised user from a previously observed address.
    group.bench_function("recognised_user", |b| {
        let (scorer, _, _, tenant) = setup_scorer();
        let ctx =
            RequestContext::new(tenant, IpAddr::from([203, 0, 113, 11])).for_user(UserId::new());
        rt.block_on(scorer.observe(&ctx));

        b.iter(|| {
            black_box(rt.block_on(scorer.assess(black_box(&ctx))));
        });
    });

    // Repeated failures hold the source at suspicious; every pass writes a
    // security log entry and consults the notification throttle.
    group.bench_function("suspicious_repeated_failures", |b| {
        let (scorer, _, _, tenant) = setup_scorer();
        let ctx =
            RequestContext::new(tenant, IpAddr::from([203, 0, 113, 12])).for_user(UserId::new());
        rt.block_on(async {
            for _ in 0..3 {
                scorer.record_login_failure(&ctx).await;
            }
        });

        b.iter(|| {
            black_box(rt.block_on(scorer.assess(black_box(&ctx))));
        });
    });

    // Failures plus a flagged address cross the critical threshold; every
    // pass re-blocks the source and audits the block.
    group.bench_function("critical_flagged_source", |b| {
        let (scorer, _, _, tenant) = setup_scorer();
        let source = IpAddr::from([203, 0, 113, 13]);
        let ctx = RequestContext::new(tenant, source).for_user(UserId::new());
        rt.block_on(async {
            for _ in 0..3 {
                scorer.record_login_failure(&ctx).await;
            }
            scorer.mark_bad_reputation(source).await.unwrap();
        });

        b.iter(|| {
            black_box(rt.block_on(scorer.assess(black_box(&ctx))));
        });
    });

    group.finish();
}

fn bench_admission_gate(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("admission_gate");
    group.sample_size(1000);

    // Benchmark: block lookup alone (the cost every request pays).
    group.bench_function("block_check_only", |b| {
        let (_, blocks, clock, _) = setup_scorer();
        let now = clock.now();
        let source = IpAddr::from([198, 51, 100, 7]);

        b.iter(|| {
            let blocked = rt.block_on(blocks.is_blocked(black_box(source), now)).unwrap();
            black_box(blocked);
        });
    });

    // Benchmark: the full gate as the middleware runs it, lookup then score.
    group.bench_function("block_check_then_assess", |b| {
        let (scorer, blocks, clock, tenant) = setup_scorer();
        let now = clock.now();
        let source = IpAddr::from([198, 51, 100, 8]);
        let ctx = RequestContext::new(tenant, source);

        b.iter(|| {
            let blocked = rt.block_on(blocks.is_blocked(black_box(source), now)).unwrap();
            if !blocked {
                black_box(rt.block_on(scorer.assess(&ctx)));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_block_lookup,
    bench_assess,
    bench_admission_gate
);
criterion_main!(benches);
