// Execution logger data model: the execution record and its typed event
// log, matching the JSON shape `spec.md` §6 documents for execution log
// files.
//
// Grounded in `original_source/core/execution_logger.py`'s ExecutionStatus,
// LogLevel, ExecutionStepType, and ExecutionRecord classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Aborted,
    Paused,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStepType {
    NodeStart,
    NodeComplete,
    NodeError,
    ToolCall,
    AgentCall,
    Checkpoint,
    Recovery,
    Rollback,
    Retry,
    Decision,
    StateChange,
    UserInput,
    MemoryUsage,
    Custom,
}

/// One structured event appended to an execution's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub step_type: ExecutionStepType,
    pub message: String,
    pub data: HashMap<String, Value>,
}

/// One entry in an execution record's `steps` list: a single node/step's
/// start-to-finish timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub status: ExecutionStatus,
}

/// One entry in an execution record's `errors` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub step: Option<String>,
    pub message: String,
    pub category: Option<String>,
}

/// Running aggregates maintained incrementally as events are appended,
/// rather than recomputed from the full event list on every query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionAggregates {
    pub step_count: u64,
    pub total_step_duration_ms: f64,
    pub max_step_duration_ms: f64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub agents_used: HashSet<String>,
    pub tools_used: HashSet<String>,
}

impl ExecutionAggregates {
    pub fn avg_step_duration_ms(&self) -> f64 {
        if self.step_count == 0 {
            0.0
        } else {
            self.total_step_duration_ms / self.step_count as f64
        }
    }
}

/// The full record of one workflow execution: status, timing, the typed
/// event/step/error logs, and running aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub name: String,
    /// Caller-defined execution kind (e.g. `"playbook"`, `"subworkflow"`);
    /// free-form per `spec.md` §3's `Execution Record.type`.
    pub execution_type: String,
    pub description: Option<String>,
    /// Correlates related executions across a request/run, e.g. a
    /// playbook invocation id a handoff sub-execution shares with its
    /// parent. Queried by `ExecutionLogHandler::list_executions`.
    pub correlation_id: Option<String>,
    pub parent_execution_id: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub initial_state: HashMap<String, Value>,
    /// Captured by `ExecutionLogger::complete` just before persistence;
    /// absent while the execution is still running.
    pub final_state: Option<HashMap<String, Value>>,
    pub events: Vec<ExecutionEvent>,
    pub steps: Vec<ExecutionStep>,
    pub errors: Vec<ExecutionErrorEntry>,
    pub aggregates: ExecutionAggregates,
}

impl ExecutionRecord {
    pub fn new(
        workflow_id: impl Into<String>,
        name: impl Into<String>,
        initial_state: HashMap<String, Value>,
    ) -> Self {
        ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            name: name.into(),
            execution_type: "workflow".to_string(),
            description: None,
            correlation_id: None,
            parent_execution_id: None,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            initial_state,
            final_state: None,
            events: Vec::new(),
            steps: Vec::new(),
            errors: Vec::new(),
            aggregates: ExecutionAggregates::default(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_parent(mut self, parent_execution_id: impl Into<String>) -> Self {
        self.parent_execution_id = Some(parent_execution_id.into());
        self
    }
}
