// ExecutionLogHandler: disk persistence, lookup, and metrics aggregation
// over execution log files.
//
// Grounded in `original_source/core/execution_logger.py`'s
// ExecutionLogHandler class.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{ExecutionRecord, ExecutionStatus};
use crate::{Result, RuntimeError};

/// Filters accepted by [`ExecutionLogHandler::list_executions`].
#[derive(Debug, Default, Clone)]
pub struct ExecutionQuery {
    pub workflow_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub name_contains: Option<String>,
    pub correlation_id: Option<String>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Aggregate metrics computed by scanning every persisted execution log
/// under the handler's root directory, optionally restricted to a window
/// by `ExecutionQuery::started_after`/`started_before`.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ExecutionMetrics {
    pub total_executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub success_rate: f64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_duration_by_step_type: HashMap<String, f64>,
    pub top_tools: Vec<(String, u64)>,
    pub top_agents: Vec<(String, u64)>,
    /// Execution count per `YYYY-MM-DD` start date.
    pub executions_by_date: HashMap<String, u64>,
}

/// Persists and retrieves execution records as `YYYY/MM/DD/<id>_<name>.json`
/// files under a root directory, matching the Python reference's on-disk
/// layout.
pub struct ExecutionLogHandler {
    root: PathBuf,
}

impl ExecutionLogHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ExecutionLogHandler { root: root.into() }
    }

    fn path_for(&self, record: &ExecutionRecord) -> PathBuf {
        let date = record.started_at.format("%Y/%m/%d");
        self.root
            .join(date.to_string())
            .join(format!("{}_{}.json", record.id, sanitize(&record.name)))
    }

    pub async fn persist(&self, record: &ExecutionRecord) -> Result<PathBuf> {
        let path = self.path_for(record);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Looks up an execution by id via a substring match over filenames
    /// across the whole tree, since the date segment of the path isn't
    /// known to callers holding only an id.
    pub async fn load(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let path = self
            .find_path(execution_id)
            .await?
            .ok_or_else(|| RuntimeError::Internal(format!("no execution log found for id {execution_id}")))?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn find_path(&self, execution_id: &str) -> Result<Option<PathBuf>> {
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(execution_id))
                    .unwrap_or(false)
                {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// Scans every execution log and returns the ones matching `query`,
    /// most recently started first, capped at `query.limit`.
    pub async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>> {
        let mut records = self.scan_all().await?;
        records.retain(|record| {
            query
                .workflow_id
                .as_ref()
                .map(|id| &record.workflow_id == id)
                .unwrap_or(true)
                && query.status.map(|status| record.status == status).unwrap_or(true)
                && query
                    .name_contains
                    .as_ref()
                    .map(|needle| record.name.contains(needle.as_str()))
                    .unwrap_or(true)
                && query
                    .correlation_id
                    .as_ref()
                    .map(|id| record.correlation_id.as_deref() == Some(id.as_str()))
                    .unwrap_or(true)
                && query.started_after.map(|after| record.started_at >= after).unwrap_or(true)
                && query.started_before.map(|before| record.started_at <= before).unwrap_or(true)
        });
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Aggregate metrics over every persisted log, optionally windowed by
    /// `query.started_after`/`started_before` (other `query` filters also
    /// apply, since this reuses the same scan).
    pub async fn metrics(&self, query: &ExecutionQuery) -> Result<ExecutionMetrics> {
        let records = self.list_executions(query).await?;
        let mut metrics = ExecutionMetrics::default();
        let mut step_durations: HashMap<String, (f64, u64)> = HashMap::new();
        let mut tool_counts: HashMap<String, u64> = HashMap::new();
        let mut agent_counts: HashMap<String, u64> = HashMap::new();

        for record in &records {
            metrics.total_executions += 1;
            match record.status {
                ExecutionStatus::Completed => metrics.completed += 1,
                ExecutionStatus::Failed => metrics.failed += 1,
                ExecutionStatus::Aborted => metrics.aborted += 1,
                _ => {}
            }
            metrics.total_tokens += record.aggregates.total_tokens;
            metrics.total_cost_usd += record.aggregates.total_cost_usd;
            for step in &record.steps {
                if let Some(duration) = step.duration_ms {
                    let entry = step_durations.entry(record.name.clone()).or_insert((0.0, 0));
                    entry.0 += duration;
                    entry.1 += 1;
                }
            }
            for tool in &record.aggregates.tools_used {
                *tool_counts.entry(tool.clone()).or_insert(0) += 1;
            }
            for agent in &record.aggregates.agents_used {
                *agent_counts.entry(agent.clone()).or_insert(0) += 1;
            }
            *metrics
                .executions_by_date
                .entry(record.started_at.format("%Y-%m-%d").to_string())
                .or_insert(0) += 1;
        }
        metrics.avg_duration_by_step_type = step_durations
            .into_iter()
            .map(|(name, (total, count))| (name, if count == 0 { 0.0 } else { total / count as f64 }))
            .collect();
        metrics.success_rate = if metrics.total_executions == 0 {
            0.0
        } else {
            metrics.completed as f64 / metrics.total_executions as f64
        };
        metrics.top_tools = top_n(tool_counts, 10);
        metrics.top_agents = top_n(agent_counts, 10);
        Ok(metrics)
    }

    async fn scan_all(&self) -> Result<Vec<ExecutionRecord>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    if let Ok(bytes) = tokio::fs::read(&path).await {
                        if let Ok(record) = serde_json::from_slice(&bytes) {
                            out.push(record);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn top_n(counts: HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
