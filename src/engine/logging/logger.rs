// ExecutionLogger: the coordinator that owns active executions, mirrors
// select events into the Progress Tracker, and hands finished records to
// the ExecutionLogHandler for disk persistence.
//
// Grounded in `original_source/core/execution_logger.py`'s ExecutionLogger
// class and its module-level `execution_logger`/`get_execution_logger`
// singleton.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::progress::ProgressTracker;
use crate::engine::state_store::StateStore;
use crate::models::{ExecutionRecord, Value};
use crate::{Result, RuntimeError};

use super::handler::{ExecutionLogHandler, ExecutionMetrics, ExecutionQuery};

/// Ties together an in-memory table of currently-running
/// [`ExecutionRecord`]s, a correlated [`ProgressTracker`] workflow id per
/// execution, and the disk-backed [`ExecutionLogHandler`] records are
/// persisted to on completion.
///
/// An execution stays in `active` until it completes, aborts, or fails, at
/// which point it is persisted and evicted — callers asking about a
/// completed execution transparently fall through to disk (matching the
/// Python reference's `active_executions` + handler split).
pub struct ExecutionLogger {
    handler: ExecutionLogHandler,
    active: DashMap<String, ExecutionRecord>,
    progress: Option<Arc<ProgressTracker>>,
    progress_ids: DashMap<String, String>,
    monitor_ceiling: Option<Duration>,
    cancellation: CancellationToken,
}

impl ExecutionLogger {
    pub fn new(log_dir: impl Into<std::path::PathBuf>) -> Self {
        ExecutionLogger {
            handler: ExecutionLogHandler::new(log_dir),
            active: DashMap::new(),
            progress: None,
            progress_ids: DashMap::new(),
            monitor_ceiling: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_progress_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn with_duration_ceiling(mut self, ceiling: Duration) -> Self {
        self.monitor_ceiling = Some(ceiling);
        self
    }

    pub fn handler(&self) -> &ExecutionLogHandler {
        &self.handler
    }

    /// Begin tracking a new execution. Captures `state_store.export_state()`
    /// as the record's `initial_state` (see `engine::state_store`'s module
    /// doc for why this is the one coherent snapshot method every caller
    /// uses) and, if a Progress Tracker is attached, creates a matching
    /// workflow item so progress and log correlate 1:1.
    pub async fn create_execution(
        &self,
        workflow_id: impl Into<String>,
        name: impl Into<String>,
        state_store: &StateStore,
    ) -> String {
        let workflow_id = workflow_id.into();
        let initial_state: HashMap<String, Value> = state_store.export_state().await;
        let record = ExecutionRecord::new(workflow_id.clone(), name.into(), initial_state);
        let execution_id = record.id.clone();

        if let Some(progress) = &self.progress {
            let progress_id = progress.create_workflow(&record.name, 1.0).await;
            self.progress_ids.insert(execution_id.clone(), progress_id);
        }

        info!(execution_id = %execution_id, workflow_id = %workflow_id, "execution created");
        self.active.insert(execution_id.clone(), record);
        execution_id
    }

    /// Mutates the active record for `execution_id` with `apply`, or
    /// returns an error if the execution isn't active (already finished, or
    /// never existed).
    fn mutate<F>(&self, execution_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let mut entry = self
            .active
            .get_mut(execution_id)
            .ok_or_else(|| RuntimeError::Internal(format!("execution {execution_id} is not active")))?;
        apply(&mut entry);
        Ok(())
    }

    pub async fn start(&self, execution_id: &str) -> Result<()> {
        if let Some(progress_id) = self.progress_ids.get(execution_id).map(|e| e.clone()) {
            if let Some(progress) = &self.progress {
                progress.start_item(&progress_id).await?;
            }
        }
        Ok(())
    }

    /// Complete the execution: capture `state_store.export_state()` as the
    /// record's `final_state` field, mark it complete, mirror completion
    /// into the Progress Tracker, persist the final record, and evict it
    /// from `active`.
    pub async fn complete(&self, execution_id: &str, state_store: &StateStore) -> Result<()> {
        let final_state = state_store.export_state().await;
        self.mutate(execution_id, |record| {
            record.final_state = Some(final_state);
            record.complete();
        })?;
        self.finish(execution_id).await
    }

    /// Tag the active execution with a correlation id, e.g. the playbook
    /// invocation id a handoff sub-execution shares with its parent.
    pub fn set_correlation_id(&self, execution_id: &str, correlation_id: impl Into<String>) -> Result<()> {
        let correlation_id = correlation_id.into();
        self.mutate(execution_id, |record| record.correlation_id = Some(correlation_id))
    }

    pub async fn abort(&self, execution_id: &str, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.mutate(execution_id, |record| {
            record.log_custom(format!("execution aborted: {reason}"), HashMap::new());
            record.abort();
        })?;
        self.finish(execution_id).await
    }

    pub async fn fail(&self, execution_id: &str, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.mutate(execution_id, |record| {
            record.log_custom(format!("execution failed: {reason}"), HashMap::new());
            record.fail();
        })?;
        if let Some(progress_id) = self.progress_ids.get(execution_id).map(|e| e.clone()) {
            if let Some(progress) = &self.progress {
                progress.fail_item(&progress_id, "execution failed").await?;
            }
        }
        self.finish(execution_id).await
    }

    pub fn pause(&self, execution_id: &str) -> Result<()> {
        self.mutate(execution_id, |record| record.pause())
    }

    pub fn resume(&self, execution_id: &str) -> Result<()> {
        self.mutate(execution_id, |record| record.resume())
    }

    /// Persist the now-terminal record to disk and drop it from `active`.
    async fn finish(&self, execution_id: &str) -> Result<()> {
        if let Some(progress_id) = self.progress_ids.get(execution_id).map(|e| e.clone()) {
            if let Some(progress) = &self.progress {
                let _ = progress.complete_item(&progress_id, false).await;
            }
        }
        let (_, record) = self
            .active
            .remove(execution_id)
            .ok_or_else(|| RuntimeError::Internal(format!("execution {execution_id} is not active")))?;
        self.handler.persist(&record).await?;
        self.progress_ids.remove(execution_id);
        Ok(())
    }

    pub fn log_step_start(&self, execution_id: &str, name: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_node_start(name))
    }

    pub fn log_step_end(&self, execution_id: &str, name: &str, duration_ms: f64) -> Result<()> {
        self.mutate(execution_id, |record| record.log_node_complete(name, duration_ms))
    }

    pub fn log_error(
        &self,
        execution_id: &str,
        step: &str,
        message: impl Into<String>,
        category: Option<String>,
    ) -> Result<()> {
        self.mutate(execution_id, |record| record.log_node_error(step, message, category))
    }

    pub fn log_tool_call(&self, execution_id: &str, tool_name: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_tool_call(tool_name))
    }

    pub fn log_agent_action(&self, execution_id: &str, agent_name: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_agent_call(agent_name))
    }

    pub fn log_checkpoint(&self, execution_id: &str, checkpoint_id: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_checkpoint(checkpoint_id))
    }

    pub fn log_rollback(&self, execution_id: &str, step: impl Into<String>, checkpoint_id: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_rollback(step, checkpoint_id))
    }

    pub fn log_retry(&self, execution_id: &str, step: impl Into<String>, attempt: u32) -> Result<()> {
        self.mutate(execution_id, |record| record.log_retry(step, attempt))
    }

    pub fn log_llm_usage(&self, execution_id: &str, tokens: u64, cost_usd: f64) -> Result<()> {
        self.mutate(execution_id, |record| record.log_llm_usage(tokens, cost_usd))
    }

    pub fn log_user_input(&self, execution_id: &str, prompt: impl Into<String>, response: impl Into<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_user_input(prompt, response))
    }

    pub fn log_decision(&self, execution_id: &str, decision: impl Into<String>, rationale: Option<String>) -> Result<()> {
        self.mutate(execution_id, |record| record.log_decision(decision, rationale))
    }

    pub fn log_state_change(&self, execution_id: &str, variable: &str, old_value: Option<Value>, new_value: Value) -> Result<()> {
        self.mutate(execution_id, |record| record.log_state_change(variable, old_value, new_value))
    }

    pub fn log_memory_usage(&self, execution_id: &str, memory_mb: f64) -> Result<()> {
        self.mutate(execution_id, |record| record.log_memory_usage(memory_mb))
    }

    /// Look up a record, checking `active` first and falling back to disk.
    pub async fn get(&self, execution_id: &str) -> Result<ExecutionRecord> {
        if let Some(entry) = self.active.get(execution_id) {
            return Ok(entry.clone());
        }
        self.handler.load(execution_id).await
    }

    pub async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>> {
        self.handler.list_executions(query).await
    }

    pub async fn metrics(&self, query: &ExecutionQuery) -> Result<ExecutionMetrics> {
        self.handler.metrics(query).await
    }

    /// Spawn a background watchdog sampling this process's RSS via
    /// `sysinfo` and warning when an active execution exceeds the
    /// configured duration ceiling, grounded in the Python reference's
    /// `psutil`-backed monitoring thread (SPEC_FULL.md §2.G; `sysinfo` is
    /// the ecosystem-idiomatic Rust replacement, since the reference crate
    /// has no existing process-monitoring dependency).
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let logger = Arc::clone(self);
        let token = logger.cancellation.clone();
        tokio::spawn(async move {
            let mut system = System::new();
            let pid = Pid::from_u32(std::process::id());
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        system.refresh_processes();
                        // `Process::memory()` returns bytes as of sysinfo 0.30.
                        let rss = system.process(pid).map(|p| p.memory()).unwrap_or(0);
                        let rss_mb = rss as f64 / (1024.0 * 1024.0);
                        let now = chrono::Utc::now();
                        for entry in logger.active.iter() {
                            let _ = logger.log_memory_usage(entry.key(), rss_mb);
                            if let Some(ceiling) = logger.monitor_ceiling {
                                let elapsed = now.signed_duration_since(entry.started_at).to_std().unwrap_or_default();
                                if elapsed > ceiling {
                                    warn!(execution_id = %entry.key(), elapsed_secs = elapsed.as_secs(), "execution exceeded duration ceiling");
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn stop_background_loops(&self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StateScope, Value};

    async fn store_with(vars: &[(&str, Value)]) -> Arc<StateStore> {
        let store = StateStore::new();
        for (name, value) in vars {
            store.declare(*name, value.clone(), StateScope::Workflow).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn create_and_complete_persists_and_evicts() {
        let dir = std::env::temp_dir().join(format!("exec_logger_test_{}", uuid::Uuid::new_v4()));
        let logger = ExecutionLogger::new(&dir);
        let store = store_with(&[("x", Value::Number(1.0))]).await;

        let execution_id = logger.create_execution("wf-1", "demo", &store).await;
        logger.start(&execution_id).await.unwrap();
        logger.log_step_start(&execution_id, "step-a").unwrap();
        logger.log_step_end(&execution_id, "step-a", 12.0).unwrap();
        logger.complete(&execution_id, &store).await.unwrap();

        let record = logger.get(&execution_id).await.unwrap();
        assert_eq!(record.status, crate::models::ExecutionStatus::Completed);
        assert_eq!(record.aggregates.step_count, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn logging_against_a_finished_execution_fails() {
        let dir = std::env::temp_dir().join(format!("exec_logger_test_{}", uuid::Uuid::new_v4()));
        let logger = ExecutionLogger::new(&dir);
        let store = store_with(&[]).await;
        let execution_id = logger.create_execution("wf-1", "demo", &store).await;
        logger.complete(&execution_id, &store).await.unwrap();

        let err = logger.log_step_start(&execution_id, "too-late").unwrap_err();
        assert!(matches!(err, RuntimeError::Internal(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
