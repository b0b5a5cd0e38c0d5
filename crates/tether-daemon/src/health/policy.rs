use tether_types::HealthStatus;

use crate::config::HealthConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub latency_ms: u64,
    pub failure_threshold: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_ms: crate::config::DEFAULT_LATENCY_THRESHOLD_MS,
            failure_threshold: crate::config::DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl From<&HealthConfig> for Thresholds {
    fn from(config: &HealthConfig) -> Self {
        Self {
            latency_ms: config.latency_threshold_ms,
            failure_threshold: config.failure_threshold,
        }
    }
}

/// Everything the classifier looks at for one target after one probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeInput {
    pub process_running: bool,
    /// Consecutive failed probes, including the latest one.
    pub missed_probes: u32,
    pub unrecoverable: bool,
    pub latency_ms: Option<u64>,
    pub avg_latency_ms: Option<u64>,
    pub recent_restarts: usize,
    pub impaired: bool,
    pub rate_limited: bool,
    pub credential_warning: bool,
}

impl ProbeInput {
    pub fn running() -> Self {
        Self {
            process_running: true,
            ..Default::default()
        }
    }
}

pub fn classify(input: &ProbeInput, thresholds: &Thresholds) -> HealthStatus {
    if !input.process_running {
        return HealthStatus::Down;
    }
    if input.unrecoverable || input.missed_probes >= thresholds.failure_threshold.max(1) {
        return HealthStatus::Down;
    }

    let slow = |ms: Option<u64>| ms.is_some_and(|ms| ms > thresholds.latency_ms);
    let degraded = input.missed_probes > 0
        || slow(input.latency_ms)
        || slow(input.avg_latency_ms)
        || input.recent_restarts > 0
        || input.impaired
        || input.rate_limited
        || input.credential_warning;

    if degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_input() -> impl Strategy<Value = ProbeInput> {
        (
            any::<bool>(),
            0u32..10,
            any::<bool>(),
            proptest::option::of(0u64..5000),
            proptest::option::of(0u64..5000),
            0usize..5,
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(process_running, missed_probes, unrecoverable, latency_ms, avg_latency_ms, recent_restarts, impaired, rate_limited, credential_warning)| ProbeInput {
                    process_running,
                    missed_probes,
                    unrecoverable,
                    latency_ms,
                    avg_latency_ms,
                    recent_restarts,
                    impaired,
                    rate_limited,
                    credential_warning,
                },
            )
    }

    #[test]
    fn test_healthy_input_is_ready() {
        let input = ProbeInput {
            latency_ms: Some(1000),
            avg_latency_ms: Some(200),
            ..ProbeInput::running()
        };
        assert_eq!(classify(&input, &Thresholds::default()), HealthStatus::Ready);
    }

    #[test]
    fn test_threshold_misses_are_down() {
        let input = ProbeInput {
            missed_probes: 3,
            ..ProbeInput::running()
        };
        assert_eq!(classify(&input, &Thresholds::default()), HealthStatus::Down);
    }

    #[test]
    fn test_remote_flags_degrade() {
        let thresholds = Thresholds::default();
        let rate_limited = ProbeInput {
            rate_limited: true,
            ..ProbeInput::running()
        };
        let expiring = ProbeInput {
            credential_warning: true,
            ..ProbeInput::running()
        };
        assert_eq!(classify(&rate_limited, &thresholds), HealthStatus::Degraded);
        assert_eq!(classify(&expiring, &thresholds), HealthStatus::Degraded);
    }

    proptest! {
        #[test]
        fn prop_not_running_is_down(input in arb_input()) {
            let input = ProbeInput { process_running: false, ..input };
            prop_assert_eq!(classify(&input, &Thresholds::default()), HealthStatus::Down);
        }

        #[test]
        fn prop_clean_running_is_ready(latency in proptest::option::of(0u64..=1000)) {
            let input = ProbeInput {
                latency_ms: latency,
                avg_latency_ms: latency,
                ..ProbeInput::running()
            };
            prop_assert_eq!(classify(&input, &Thresholds::default()), HealthStatus::Ready);
        }

        #[test]
        fn prop_any_impairment_is_degraded(
            missed in 1u32..=2,
            slow in 1001u64..10_000,
            restarts in 1usize..10,
            which in 0u8..3,
        ) {
            let mut input = ProbeInput::running();
            match which {
                0 => input.missed_probes = missed,
                1 => input.latency_ms = Some(slow),
                _ => input.recent_restarts = restarts,
            }
            prop_assert_eq!(classify(&input, &Thresholds::default()), HealthStatus::Degraded);
        }

        #[test]
        fn prop_unrecoverable_is_down(input in arb_input()) {
            let status = classify(&input, &Thresholds::default());
            if input.unrecoverable {
                prop_assert_eq!(status, HealthStatus::Down);
            }
        }
    }
}
