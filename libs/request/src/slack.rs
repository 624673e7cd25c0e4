//! Slack bookkeeping for a single pipeline run.

use std::time::Duration;

use crate::types::Metrics;

/// Accumulates slack across the steps of one pipeline run.
///
/// Slack is cumulative: each step adds the difference between its profiled
/// and observed duration to the running figure, so a step that finishes early
/// banks time that later steps may spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlackTracker {
    slack: i64,
    sum_of_slack: i64,
    previous_slack: i64,
}

impl SlackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed step.
    pub fn record(&mut self, profiled: Duration, elapsed: Duration) {
        self.previous_slack = self.slack;
        self.slack = self
            .slack
            .saturating_add(as_nanos(profiled).saturating_sub(as_nanos(elapsed)));
        self.sum_of_slack = self.sum_of_slack.saturating_add(self.slack);
    }

    /// Metrics to attach to the request for the next step.
    pub fn metrics_for(&self, profiled: Duration) -> Metrics {
        Metrics {
            slack: self.slack,
            sum_of_slack: self.sum_of_slack,
            previous_slack: self.previous_slack,
            profiled_execution_time: as_nanos(profiled),
        }
    }

    pub fn slack(&self) -> i64 {
        self.slack
    }
}

fn as_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}
