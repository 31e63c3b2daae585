//! `crewdesk-threat` — request scoring and network quarantine.
//!
//! Scoring is heuristic defense-in-depth layered in front of authorization:
//! it weighs recent history (login failures, known IPs, travel velocity,
//! reputation) into a verdict, quarantines hostile sources, and fails open
//! when its own stores are down so it can never take the product down with
//! it. Authorization remains the security boundary.

pub mod blocklist;
pub mod context;
pub mod counters;
pub mod log;
pub mod scorer;
pub mod signal;
pub mod throttle;

pub use blocklist::{BlockEntry, BlockStore, BlockStoreError, InMemoryBlockStore};
pub use context::{GeoPoint, RequestContext};
pub use counters::{CounterStore, CounterStoreError, InMemoryCounterStore};
pub use log::{InMemorySecurityLogStore, SecurityLogEntry, SecurityLogStore, SecurityLogStoreError};
pub use scorer::{Assessment, ThreatScorer};
pub use signal::{SignalWeights, ThreatConfig, ThreatSignal, Verdict, labels, score_signals};
pub use throttle::NotificationThrottle;
