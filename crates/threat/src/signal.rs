//! Threat signals, weights and verdicts.
//!
//! Scoring is a pure function from observed signals to points; the thresholds
//! and weights are configuration, not law. Everything here is deterministic
//! and has no store access, which is what makes the scorer testable.

use serde::{Deserialize, Serialize};

/// One observed indicator of hostile or anomalous behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreatSignal {
    /// Failed login attempts from this source reached the configured
    /// threshold within the counting window.
    RepeatedLoginFailures { count: u32 },
    /// The source IP has never been seen for this user.
    UnrecognizedIp,
    /// Implied travel speed between the last seen location and this request
    /// exceeds what a plane could do.
    ImpossibleTravel { speed_kmh: u32 },
    /// The source IP is on the bad-reputation list.
    BadIpReputation,
}

impl ThreatSignal {
    /// Stable label used in logs, audit payloads and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RepeatedLoginFailures { .. } => "repeated_login_failures",
            Self::UnrecognizedIp => "unrecognized_ip",
            Self::ImpossibleTravel { .. } => "impossible_travel",
            Self::BadIpReputation => "bad_ip_reputation",
        }
    }

    pub fn points(&self, weights: &SignalWeights) -> u32 {
        match self {
            Self::RepeatedLoginFailures { .. } => weights.repeated_login_failures,
            Self::UnrecognizedIp => weights.unrecognized_ip,
            Self::ImpossibleTravel { .. } => weights.impossible_travel,
            Self::BadIpReputation => weights.bad_ip_reputation,
        }
    }
}

/// Labels of a signal set, in observation order.
pub fn labels(signals: &[ThreatSignal]) -> Vec<String> {
    signals.iter().map(|s| s.label().to_string()).collect()
}

/// Points contributed by each signal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub repeated_login_failures: u32,
    pub unrecognized_ip: u32,
    pub impossible_travel: u32,
    pub bad_ip_reputation: u32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            repeated_login_failures: 30,
            unrecognized_ip: 20,
            impossible_travel: 25,
            bad_ip_reputation: 40,
        }
    }
}

/// Thresholds, windows and weights for the scorer.
#[derive(Debug, Clone, Copy)]
pub struct ThreatConfig {
    /// Failed logins at or above this count raise [`ThreatSignal::RepeatedLoginFailures`].
    pub failed_login_threshold: u32,
    /// TTL of the failed-login counter.
    pub failed_login_window_secs: u64,
    /// Points at or above this are [`Verdict::Suspicious`].
    pub suspicious_threshold: u32,
    /// Points at or above this are [`Verdict::Critical`].
    pub critical_threshold: u32,
    /// How long a critical verdict keeps the source blocked.
    pub ip_block_ttl_secs: u64,
    /// Implied speeds above this raise [`ThreatSignal::ImpossibleTravel`].
    pub impossible_travel_kmh: f64,
    /// Minimum gap between notifications for the same tenant/kind/source.
    pub rate_limit_window_secs: u64,
    /// How long a successfully-used IP stays "recognised" for a user.
    pub known_ip_ttl_secs: u64,
    pub weights: SignalWeights,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            failed_login_threshold: 3,
            failed_login_window_secs: 900,
            suspicious_threshold: 50,
            critical_threshold: 80,
            ip_block_ttl_secs: 1800,
            impossible_travel_kmh: 900.0,
            rate_limit_window_secs: 3600,
            known_ip_ttl_secs: 30 * 24 * 3600,
            weights: SignalWeights::default(),
        }
    }
}

/// Total points for a signal set. Adding a signal never lowers the score.
pub fn score_signals(signals: &[ThreatSignal], weights: &SignalWeights) -> u32 {
    signals
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.points(weights)))
}

/// What the caller should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Proceed normally.
    Clear,
    /// Proceed, but the activity has been logged and flagged.
    Suspicious,
    /// Reject the request; the source is being quarantined.
    Critical,
}

impl Verdict {
    pub fn from_points(points: u32, config: &ThreatConfig) -> Self {
        if points >= config.critical_threshold {
            Self::Critical
        } else if points >= config.suspicious_threshold {
            Self::Suspicious
        } else {
            Self::Clear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_weights_reproduce_the_documented_scores() {
        let weights = SignalWeights::default();

        let brute_force_from_new_ip = [
            ThreatSignal::RepeatedLoginFailures { count: 3 },
            ThreatSignal::UnrecognizedIp,
        ];
        assert_eq!(score_signals(&brute_force_from_new_ip, &weights), 50);

        let hostile = [
            ThreatSignal::BadIpReputation,
            ThreatSignal::ImpossibleTravel { speed_kmh: 4500 },
            ThreatSignal::UnrecognizedIp,
        ];
        assert_eq!(score_signals(&hostile, &weights), 85);
    }

    #[test]
    fn verdict_thresholds_are_inclusive() {
        let config = ThreatConfig::default();

        assert_eq!(Verdict::from_points(49, &config), Verdict::Clear);
        assert_eq!(Verdict::from_points(50, &config), Verdict::Suspicious);
        assert_eq!(Verdict::from_points(79, &config), Verdict::Suspicious);
        assert_eq!(Verdict::from_points(80, &config), Verdict::Critical);
    }

    #[test]
    fn verdicts_order_by_severity() {
        assert!(Verdict::Clear < Verdict::Suspicious);
        assert!(Verdict::Suspicious < Verdict::Critical);
    }

    fn any_signal() -> impl Strategy<Value = ThreatSignal> {
        prop_oneof![
            (1u32..20).prop_map(|count| ThreatSignal::RepeatedLoginFailures { count }),
            Just(ThreatSignal::UnrecognizedIp),
            (901u32..20_000).prop_map(|speed_kmh| ThreatSignal::ImpossibleTravel { speed_kmh }),
            Just(ThreatSignal::BadIpReputation),
        ]
    }

    proptest! {
        #[test]
        fn adding_a_signal_never_lowers_the_score(
            base in proptest::collection::vec(any_signal(), 0..6),
            extra in any_signal(),
        ) {
            let weights = SignalWeights::default();
            let before = score_signals(&base, &weights);

            let mut extended = base.clone();
            extended.push(extra);

            prop_assert!(score_signals(&extended, &weights) >= before);
        }
    }
}
