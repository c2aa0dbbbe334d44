// Execution record lifecycle and the typed `log_*` convenience methods,
// extending `models::ExecutionRecord` the way `engine::progress` extends
// its item model with behavior.
//
// Grounded in `original_source/core/execution_logger.py`'s ExecutionRecord
// class.

use chrono::Utc;
use std::collections::HashMap;

use crate::models::{
    ExecutionErrorEntry, ExecutionEvent, ExecutionRecord, ExecutionStatus, ExecutionStep,
    ExecutionStepType, LogLevel, Value,
};

impl ExecutionRecord {
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn abort(&mut self) {
        self.status = ExecutionStatus::Aborted;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn pause(&mut self) {
        self.status = ExecutionStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    fn push_event(&mut self, level: LogLevel, step_type: ExecutionStepType, message: impl Into<String>, data: HashMap<String, Value>) {
        self.events.push(ExecutionEvent {
            timestamp: Utc::now(),
            level,
            step_type,
            message: message.into(),
            data,
        });
    }

    pub fn log_node_start(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.steps.push(ExecutionStep {
            name: name.clone(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
        });
        self.push_event(
            LogLevel::Info,
            ExecutionStepType::NodeStart,
            format!("node '{name}' started"),
            HashMap::new(),
        );
    }

    pub fn log_node_complete(&mut self, name: &str, duration_ms: f64) {
        if let Some(step) = self.steps.iter_mut().rev().find(|step| step.name == name && step.completed_at.is_none()) {
            step.completed_at = Some(Utc::now());
            step.duration_ms = Some(duration_ms);
            step.status = ExecutionStatus::Completed;
        }
        self.aggregates.step_count += 1;
        self.aggregates.total_step_duration_ms += duration_ms;
        self.aggregates.max_step_duration_ms = self.aggregates.max_step_duration_ms.max(duration_ms);
        self.push_event(
            LogLevel::Info,
            ExecutionStepType::NodeComplete,
            format!("node '{name}' completed in {duration_ms:.1}ms"),
            HashMap::new(),
        );
    }

    pub fn log_node_error(&mut self, name: &str, message: impl Into<String>, category: Option<String>) {
        let message = message.into();
        if let Some(step) = self.steps.iter_mut().rev().find(|step| step.name == name && step.completed_at.is_none()) {
            step.completed_at = Some(Utc::now());
            step.status = ExecutionStatus::Failed;
        }
        self.errors.push(ExecutionErrorEntry {
            timestamp: Utc::now(),
            step: Some(name.to_string()),
            message: message.clone(),
            category: category.clone(),
        });
        self.push_event(
            LogLevel::Error,
            ExecutionStepType::NodeError,
            format!("node '{name}' failed: {message}"),
            HashMap::new(),
        );
    }

    pub fn log_tool_call(&mut self, tool_name: impl Into<String>) {
        let tool_name = tool_name.into();
        self.aggregates.tools_used.insert(tool_name.clone());
        self.push_event(
            LogLevel::Debug,
            ExecutionStepType::ToolCall,
            format!("tool '{tool_name}' invoked"),
            HashMap::new(),
        );
    }

    pub fn log_agent_call(&mut self, agent_name: impl Into<String>) {
        let agent_name = agent_name.into();
        self.aggregates.agents_used.insert(agent_name.clone());
        self.push_event(
            LogLevel::Debug,
            ExecutionStepType::AgentCall,
            format!("agent '{agent_name}' invoked"),
            HashMap::new(),
        );
    }

    pub fn log_checkpoint(&mut self, checkpoint_id: impl Into<String>) {
        let checkpoint_id = checkpoint_id.into();
        let mut data = HashMap::new();
        data.insert("checkpoint_id".to_string(), Value::String(checkpoint_id.clone()));
        self.push_event(
            LogLevel::Debug,
            ExecutionStepType::Checkpoint,
            format!("checkpoint {checkpoint_id} captured"),
            data,
        );
    }

    pub fn log_recovery(&mut self, step: impl Into<String>, action: impl Into<String>) {
        let step = step.into();
        let action = action.into();
        let mut data = HashMap::new();
        data.insert("action".to_string(), Value::String(action.clone()));
        self.push_event(
            LogLevel::Warning,
            ExecutionStepType::Recovery,
            format!("recovering step '{step}' via {action}"),
            data,
        );
    }

    pub fn log_retry(&mut self, step: impl Into<String>, attempt: u32) {
        let step = step.into();
        let mut data = HashMap::new();
        data.insert("attempt".to_string(), Value::Number(attempt as f64));
        self.push_event(
            LogLevel::Warning,
            ExecutionStepType::Retry,
            format!("retrying step '{step}', attempt {attempt}"),
            data,
        );
    }

    pub fn log_tokens(&mut self, amount: u64) {
        self.aggregates.total_tokens += amount;
    }

    pub fn log_cost(&mut self, amount_usd: f64) {
        self.aggregates.total_cost_usd += amount_usd;
    }

    /// Records one LLM call's token and dollar cost in a single event,
    /// updating both aggregates together.
    pub fn log_llm_usage(&mut self, tokens: u64, cost_usd: f64) {
        self.log_tokens(tokens);
        self.log_cost(cost_usd);
        let mut data = HashMap::new();
        data.insert("tokens".to_string(), Value::Number(tokens as f64));
        data.insert("cost_usd".to_string(), Value::Number(cost_usd));
        self.push_event(
            LogLevel::Debug,
            ExecutionStepType::ToolCall,
            format!("llm usage: {tokens} tokens, ${cost_usd:.4}"),
            data,
        );
    }

    /// Records a decision point, e.g. a conditional branch taken by a
    /// workflow node.
    pub fn log_decision(&mut self, decision: impl Into<String>, rationale: Option<String>) {
        let decision = decision.into();
        let mut data = HashMap::new();
        if let Some(rationale) = &rationale {
            data.insert("rationale".to_string(), Value::String(rationale.clone()));
        }
        self.push_event(
            LogLevel::Info,
            ExecutionStepType::Decision,
            format!("decision: {decision}"),
            data,
        );
    }

    /// Records a state variable change visible to the execution log,
    /// distinct from the State Store's own change-history ring.
    pub fn log_state_change(&mut self, variable: impl Into<String>, old_value: Option<Value>, new_value: Value) {
        let variable = variable.into();
        let mut data = HashMap::new();
        if let Some(old_value) = old_value {
            data.insert("old_value".to_string(), old_value);
        }
        data.insert("new_value".to_string(), new_value);
        self.push_event(
            LogLevel::Info,
            ExecutionStepType::StateChange,
            format!("state variable '{variable}' changed"),
            data,
        );
    }

    /// Records a rollback to a prior checkpoint, distinct from the more
    /// general [`Self::log_recovery`] event.
    pub fn log_rollback(&mut self, step: impl Into<String>, checkpoint_id: impl Into<String>) {
        let step = step.into();
        let checkpoint_id = checkpoint_id.into();
        let mut data = HashMap::new();
        data.insert("checkpoint_id".to_string(), Value::String(checkpoint_id.clone()));
        self.push_event(
            LogLevel::Warning,
            ExecutionStepType::Rollback,
            format!("rolled back step '{step}' to checkpoint {checkpoint_id}"),
            data,
        );
    }

    /// Records a human-in-the-loop prompt/response pair.
    pub fn log_user_input(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        let mut data = HashMap::new();
        data.insert("prompt".to_string(), Value::String(prompt.into()));
        data.insert("response".to_string(), Value::String(response.into()));
        self.push_event(LogLevel::Info, ExecutionStepType::UserInput, "user input received".to_string(), data);
    }

    /// Records a point-in-time process memory sample, independent of the
    /// Execution Logger's background watchdog (see `ExecutionLogger::start_monitoring`).
    pub fn log_memory_usage(&mut self, memory_mb: f64) {
        let mut data = HashMap::new();
        data.insert("memory_mb".to_string(), Value::Number(memory_mb));
        self.push_event(
            LogLevel::Debug,
            ExecutionStepType::MemoryUsage,
            format!("memory usage: {memory_mb:.1}MB"),
            data,
        );
    }

    pub fn log_custom(&mut self, message: impl Into<String>, data: HashMap<String, Value>) {
        self.push_event(LogLevel::Info, ExecutionStepType::Custom, message, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[test]
    fn node_lifecycle_updates_aggregates() {
        let mut record = ExecutionRecord::new("wf", "run", Map::new());
        record.log_node_start("step-1");
        record.log_node_complete("step-1", 42.0);
        assert_eq!(record.aggregates.step_count, 1);
        assert_eq!(record.aggregates.total_step_duration_ms, 42.0);
        assert_eq!(record.steps[0].status, ExecutionStatus::Completed);
    }

    #[test]
    fn error_logging_marks_step_failed_and_records_entry() {
        let mut record = ExecutionRecord::new("wf", "run", Map::new());
        record.log_node_start("step-1");
        record.log_node_error("step-1", "boom", Some("transient".into()));
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.steps[0].status, ExecutionStatus::Failed);
    }

    #[test]
    fn tool_and_agent_usage_is_deduplicated() {
        let mut record = ExecutionRecord::new("wf", "run", Map::new());
        record.log_tool_call("search");
        record.log_tool_call("search");
        record.log_agent_call("planner");
        assert_eq!(record.aggregates.tools_used.len(), 1);
        assert_eq!(record.aggregates.agents_used.len(), 1);
    }

    #[test]
    fn llm_usage_updates_both_token_and_cost_aggregates() {
        let mut record = ExecutionRecord::new("wf", "run", Map::new());
        record.log_llm_usage(150, 0.002);
        assert_eq!(record.aggregates.total_tokens, 150);
        assert!((record.aggregates.total_cost_usd - 0.002).abs() < f64::EPSILON);
    }

    #[test]
    fn decision_state_change_rollback_and_user_input_events_are_recorded() {
        let mut record = ExecutionRecord::new("wf", "run", Map::new());
        record.log_decision("take branch A", Some("condition matched".into()));
        record.log_state_change("retries", Some(Value::Number(1.0)), Value::Number(2.0));
        record.log_rollback("step-1", "cp-1");
        record.log_user_input("continue?", "yes");
        record.log_memory_usage(42.5);
        assert_eq!(record.events.len(), 5);
        assert!(matches!(record.events[0].step_type, ExecutionStepType::Decision));
        assert!(matches!(record.events[1].step_type, ExecutionStepType::StateChange));
        assert!(matches!(record.events[2].step_type, ExecutionStepType::Rollback));
        assert!(matches!(record.events[3].step_type, ExecutionStepType::UserInput));
        assert!(matches!(record.events[4].step_type, ExecutionStepType::MemoryUsage));
    }
}
