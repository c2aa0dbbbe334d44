// ProgressEstimator: ETA estimation via a bounded history of progress-rate
// samples, plus initial-estimate scaling from historically similar
// completions.
//
// Grounded in `original_source/core/progress_tracker.py`'s
// ProgressEstimator class.

use std::collections::HashMap;
use std::time::Instant;

/// A single completed item's recorded (total_work, wall_clock_secs) used to
/// scale an initial estimate for a new, similarly-sized item.
#[derive(Debug, Clone, Copy)]
struct CompletionRecord {
    total_work: f64,
    duration_secs: f64,
}

/// One sample of "how much progress happened in how much wall-clock time",
/// used to compute a progress rate.
#[derive(Debug, Clone, Copy)]
struct RateSample {
    at: Instant,
    percent_complete: f64,
}

/// Bounds how many rate samples and completion records are retained per
/// item / globally, matching the Python reference's bounded history
/// windows.
const MAX_SAMPLES_PER_ITEM: usize = 20;
const MAX_COMPLETION_HISTORY: usize = 200;

#[derive(Default)]
pub struct ProgressEstimator {
    samples: HashMap<String, Vec<RateSample>>,
    completions: Vec<CompletionRecord>,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_estimation(&mut self, item_id: &str) {
        self.samples.entry(item_id.to_string()).or_default();
    }

    pub fn update_progress(&mut self, item_id: &str, percent_complete: f64) {
        let history = self.samples.entry(item_id.to_string()).or_default();
        history.push(RateSample {
            at: Instant::now(),
            percent_complete,
        });
        if history.len() > MAX_SAMPLES_PER_ITEM {
            history.remove(0);
        }
    }

    /// Median percent-per-second rate over the retained sample window,
    /// used to project remaining time: `(100 - current) / rate`.
    pub fn eta_secs(&self, item_id: &str, current_percent: f64) -> Option<f64> {
        let history = self.samples.get(item_id)?;
        if history.len() < 2 {
            return None;
        }
        let mut rates: Vec<f64> = history
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (pair[0], pair[1]);
                let dt = (next.at - prev.at).as_secs_f64();
                if dt <= 0.0 {
                    return None;
                }
                let dp = next.percent_complete - prev.percent_complete;
                Some(dp / dt)
            })
            .filter(|rate| *rate > 0.0)
            .collect();
        if rates.is_empty() {
            return None;
        }
        rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median_rate = rates[rates.len() / 2];
        if median_rate <= 0.0 {
            return None;
        }
        Some(((100.0 - current_percent).max(0.0)) / median_rate)
    }

    pub fn complete_estimation(&mut self, item_id: &str, total_work: f64, duration_secs: f64) {
        self.samples.remove(item_id);
        self.completions.push(CompletionRecord {
            total_work,
            duration_secs,
        });
        if self.completions.len() > MAX_COMPLETION_HISTORY {
            self.completions.remove(0);
        }
    }

    /// Scale an initial duration estimate for `total_work` from past
    /// completions whose own `total_work` fell within 0.5x-2x of it,
    /// matching `get_initial_estimate` in the Python reference.
    pub fn initial_estimate(&self, total_work: f64) -> Option<f64> {
        if total_work <= 0.0 {
            return None;
        }
        let lower = total_work * 0.5;
        let upper = total_work * 2.0;
        let similar: Vec<&CompletionRecord> = self
            .completions
            .iter()
            .filter(|record| record.total_work >= lower && record.total_work <= upper)
            .collect();
        if similar.is_empty() {
            return None;
        }
        let scaled: Vec<f64> = similar
            .iter()
            .map(|record| record.duration_secs / record.total_work * total_work)
            .collect();
        Some(scaled.iter().sum::<f64>() / scaled.len() as f64)
    }
}
