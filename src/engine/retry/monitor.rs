// Retry monitoring: per-(workflow, step) attempt history and aggregate
// reporting.
//
// Grounded in `original_source/core/retry_system.py`'s RetryMonitorRecord,
// RetryMonitor, and RetryReporter classes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::engine::error_category::ErrorCategory;

/// One recorded retry attempt outcome, matching `spec.md` §6's retry
/// monitor record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMonitorRecord {
    pub workflow_id: String,
    pub step_id: String,
    pub policy_name: String,
    pub attempt: u32,
    pub succeeded: bool,
    pub category: Option<ErrorCategory>,
    pub delay_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate stats for one `(workflow_id, step_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_delay_ms: u64,
}

impl RetryStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_attempts as f64
        }
    }
}

/// Collects [`RetryMonitorRecord`]s and maintains running per-step stats.
#[derive(Default)]
pub struct RetryMonitor {
    records: DashMap<(String, String), Vec<RetryMonitorRecord>>,
    stats: DashMap<(String, String), RetryStats>,
}

impl RetryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: RetryMonitorRecord) {
        let key = (record.workflow_id.clone(), record.step_id.clone());
        let mut stats = self.stats.entry(key.clone()).or_default();
        stats.total_attempts += 1;
        stats.total_delay_ms += record.delay_ms;
        if record.succeeded {
            stats.total_successes += 1;
        } else {
            stats.total_failures += 1;
        }
        drop(stats);
        self.records.entry(key).or_default().push(record);
    }

    pub fn stats_for(&self, workflow_id: &str, step_id: &str) -> RetryStats {
        self.stats
            .get(&(workflow_id.to_string(), step_id.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn history_for(&self, workflow_id: &str, step_id: &str) -> Vec<RetryMonitorRecord> {
        self.records
            .get(&(workflow_id.to_string(), step_id.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Ranks `(workflow_id, step_id)` pairs by total retry attempts,
    /// most-retried first, capped at `limit`.
    pub fn most_retried_steps(&self, limit: usize) -> Vec<((String, String), RetryStats)> {
        let mut entries: Vec<((String, String), RetryStats)> = self
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| {
            b.1.total_attempts
                .cmp(&a.1.total_attempts)
                .then_with(|| a.0.cmp(&b.0))
        });
        entries.truncate(limit);
        entries
    }
}

/// Produces human-readable summaries over a [`RetryMonitor`]'s collected
/// records, matching the Python reference's `RetryReporter`.
pub struct RetryReporter<'a> {
    monitor: &'a RetryMonitor,
}

impl<'a> RetryReporter<'a> {
    pub fn new(monitor: &'a RetryMonitor) -> Self {
        RetryReporter { monitor }
    }

    pub fn summary_for(&self, workflow_id: &str, step_id: &str) -> String {
        let stats = self.monitor.stats_for(workflow_id, step_id);
        format!(
            "{workflow_id}/{step_id}: {} attempts, {:.1}% success rate, {}ms total delay",
            stats.total_attempts,
            stats.success_rate() * 100.0,
            stats.total_delay_ms
        )
    }

    /// Human-readable lines for the `limit` most-retried steps, most
    /// attempts first.
    pub fn most_retried_summary(&self, limit: usize) -> Vec<String> {
        self.monitor
            .most_retried_steps(limit)
            .into_iter()
            .map(|((workflow_id, step_id), stats)| {
                format!(
                    "{workflow_id}/{step_id}: {} attempts, {:.1}% success rate",
                    stats.total_attempts,
                    stats.success_rate() * 100.0
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_across_records() {
        let monitor = RetryMonitor::new();
        monitor.record(RetryMonitorRecord {
            workflow_id: "wf".into(),
            step_id: "s1".into(),
            policy_name: "default".into(),
            attempt: 1,
            succeeded: false,
            category: Some(ErrorCategory::Transient),
            delay_ms: 100,
            recorded_at: Utc::now(),
        });
        monitor.record(RetryMonitorRecord {
            workflow_id: "wf".into(),
            step_id: "s1".into(),
            policy_name: "default".into(),
            attempt: 2,
            succeeded: true,
            category: None,
            delay_ms: 200,
            recorded_at: Utc::now(),
        });
        let stats = monitor.stats_for("wf", "s1");
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_delay_ms, 300);
    }

    #[test]
    fn reporter_formats_a_human_readable_summary() {
        let monitor = RetryMonitor::new();
        monitor.record(RetryMonitorRecord {
            workflow_id: "wf".into(),
            step_id: "s1".into(),
            policy_name: "default".into(),
            attempt: 1,
            succeeded: true,
            category: None,
            delay_ms: 0,
            recorded_at: Utc::now(),
        });
        let report = RetryReporter::new(&monitor).summary_for("wf", "s1");
        assert!(report.contains("100.0% success rate"));
    }

    #[test]
    fn most_retried_steps_ranks_by_attempt_count() {
        let monitor = RetryMonitor::new();
        for attempt in 1..=3 {
            monitor.record(RetryMonitorRecord {
                workflow_id: "wf".into(),
                step_id: "hot".into(),
                policy_name: "default".into(),
                attempt,
                succeeded: attempt == 3,
                category: None,
                delay_ms: 50,
                recorded_at: Utc::now(),
            });
        }
        monitor.record(RetryMonitorRecord {
            workflow_id: "wf".into(),
            step_id: "cold".into(),
            policy_name: "default".into(),
            attempt: 1,
            succeeded: true,
            category: None,
            delay_ms: 10,
            recorded_at: Utc::now(),
        });

        let top = monitor.most_retried_steps(5);
        assert_eq!(top[0].0, ("wf".to_string(), "hot".to_string()));
        assert_eq!(top[0].1.total_attempts, 3);
        assert_eq!(top[1].0, ("wf".to_string(), "cold".to_string()));

        let summary = RetryReporter::new(&monitor).most_retried_summary(1);
        assert_eq!(summary.len(), 1);
        assert!(summary[0].starts_with("wf/hot"));
    }
}
