//! Quota arithmetic: the PI(D) controller and the threshold clip.
//!
//! Slack arrives in nanoseconds. The combined controller term is converted to
//! milliseconds and added, with its sign flipped, to the baseline period: a
//! pipeline running ahead of schedule asks for less CPU, one running late asks
//! for more.

use seqclock_request::Metrics;

/// Scheduling period of the container runtime, in microseconds.
///
/// Also the baseline quota a step receives when it is exactly on schedule.
pub const CPU_PERIOD: i64 = 100_000;

/// Smallest quota the fair-share scaling may apply to a container.
pub const CPU_QUOTA_LOWER_BOUND: i64 = 1_000;

/// Quota value that lifts any CPU restriction from a container.
pub const UNRESTRICTED_QUOTA: i64 = -1;

pub const KP: i64 = 10;
pub const KI: i64 = 1;
pub const KD: i64 = 0;

/// Floors applied to computed quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaBounds {
    /// Minimum desired quota a request can be granted.
    pub floor: i64,

    /// Minimum quota left to a container after fair-share scaling.
    pub throttle_floor: i64,
}

impl Default for QuotaBounds {
    fn default() -> Self {
        Self {
            floor: 5 * CPU_QUOTA_LOWER_BOUND,
            throttle_floor: CPU_QUOTA_LOWER_BOUND,
        }
    }
}

impl QuotaBounds {
    /// Raise a fair-share scaled quota to the throttle floor.
    pub fn throttle(&self, quota: i64) -> i64 {
        quota.max(self.throttle_floor)
    }
}

/// Total quota a node with `cores` cores can hand out per period.
pub fn capacity(cores: i64) -> i64 {
    cores.saturating_mul(CPU_PERIOD)
}

/// Controller output in milliseconds for the given slack metrics.
pub fn compute_pid_output(metrics: &Metrics) -> i64 {
    let term = KP
        .saturating_mul(metrics.slack)
        .saturating_add(KI.saturating_mul(metrics.sum_of_slack))
        .saturating_add(KD.saturating_mul(metrics.previous_slack));
    -nanos_to_millis(term)
}

/// Clip a quota into `[floor, cores * period]`.
pub fn retain_cpu_threshold(quota: i64, cores: i64, bounds: &QuotaBounds) -> i64 {
    let threshold = capacity(cores);
    if quota > threshold {
        threshold
    } else if quota <= bounds.floor {
        bounds.floor
    } else {
        quota
    }
}

/// Quota a request with these metrics should be granted.
pub fn desired_quota(metrics: &Metrics, cores: i64, bounds: &QuotaBounds) -> i64 {
    retain_cpu_threshold(
        CPU_PERIOD.saturating_add(compute_pid_output(metrics)),
        cores,
        bounds,
    )
}

fn nanos_to_millis(nanos: i64) -> i64 {
    (nanos as f64 * 0.000_001).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn metrics(slack: i64, sum_of_slack: i64, previous_slack: i64) -> Metrics {
        Metrics {
            slack,
            sum_of_slack,
            previous_slack,
            profiled_execution_time: 0,
        }
    }

    #[test]
    fn test_zero_slack_yields_zero_output() {
        assert_eq!(compute_pid_output(&metrics(0, 0, 0)), 0);
    }

    #[test]
    fn test_positive_slack_shrinks_output() {
        // 10 * 1ms + 1 * 2ms = 12ms
        assert_eq!(compute_pid_output(&metrics(1_000_000, 2_000_000, 0)), -12);
    }

    #[test]
    fn test_negative_slack_grows_output() {
        assert_eq!(compute_pid_output(&metrics(-15_000_000_000, 0, 0)), 150_000);
    }

    #[test]
    fn test_derivative_gain_is_disabled() {
        assert_eq!(compute_pid_output(&metrics(0, 0, 999_000_000_000)), 0);
    }

    #[test]
    fn test_output_rounds_to_nearest_millisecond() {
        // 10 * 0.06ms = 0.6ms
        assert_eq!(compute_pid_output(&metrics(60_000, 0, 0)), -1);
        // 10 * 0.04ms = 0.4ms
        assert_eq!(compute_pid_output(&metrics(40_000, 0, 0)), 0);
    }

    #[rstest]
    #[case(100_000, 4, 100_000)]
    #[case(400_000, 4, 400_000)]
    #[case(400_001, 4, 400_000)]
    #[case(5_000, 4, 5_000)]
    #[case(5_001, 4, 5_001)]
    #[case(-20, 4, 5_000)]
    #[case(250_000, 2, 200_000)]
    fn test_retain_cpu_threshold(#[case] quota: i64, #[case] cores: i64, #[case] expected: i64) {
        assert_eq!(
            retain_cpu_threshold(quota, cores, &QuotaBounds::default()),
            expected
        );
    }

    #[test]
    fn test_configurable_floor() {
        let bounds = QuotaBounds {
            floor: 1_000,
            throttle_floor: 1_000,
        };
        assert_eq!(retain_cpu_threshold(500, 4, &bounds), 1_000);
        assert_eq!(retain_cpu_threshold(4_000, 4, &bounds), 4_000);
    }

    #[test]
    fn test_desired_quota_on_schedule_is_baseline() {
        assert_eq!(
            desired_quota(&metrics(0, 0, 0), 4, &QuotaBounds::default()),
            CPU_PERIOD
        );
    }

    #[test]
    fn test_desired_quota_far_ahead_hits_floor() {
        assert_eq!(
            desired_quota(&metrics(60_000_000_000, 0, 0), 4, &QuotaBounds::default()),
            5_000
        );
    }
}
