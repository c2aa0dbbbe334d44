// WorkflowGraph: runs a set of GraphNodes starting from an entry node,
// following each node's self-chosen successors until every reachable node
// has completed or the run fails outright.
//
// Grounded in `original_source/core/graph_workflow.py`'s GraphWorkflow
// class, generalized per SPEC_FULL.md §2.J: that reference hardcodes a
// 5-node example graph's per-node-type Skip defaults and leans on a
// third-party graph library for multi-predecessor fan-in convergence.
// Neither is part of this crate's required surface, so recovery defaults
// are a caller-populated registry keyed by node id, and traversal is a
// plain frontier walk over node-declared successor ids with a visited-once
// dedup set rather than a fan-in-aware DAG scheduler.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::logging::ExecutionLogger;
use crate::engine::progress::ProgressTracker;
use crate::engine::recovery::{RecoveryManager, RecoveryOutcome};
use crate::engine::state_store::StateStore;
use crate::models::Value;
use crate::{Result, RuntimeError};

use super::node::{GraphNode, NodeOutcome};

/// What a full graph run produced. Mirrors the shape of the Execution
/// Logger's failure records: a completed run carries every node's output
/// keyed by node id; a failed run carries whatever outputs were produced
/// before the failure plus the error's source chain (the same
/// `source()`-walking pattern `ExecutionLogHandler` uses, reused here
/// rather than a raw formatted traceback string).
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub succeeded: bool,
    pub outputs: HashMap<String, Value>,
    pub failed_node: Option<String>,
    pub error_chain: Vec<String>,
}

/// Runs a graph of [`GraphNode`]s, wiring each node's execution through the
/// Recovery Manager (so retries, rollbacks, and alternate paths apply to
/// graph steps exactly as they do to any other step) and mirroring
/// progress and execution events the way the rest of the engine does.
pub struct WorkflowGraph {
    nodes: HashMap<String, Arc<dyn GraphNode>>,
    skip_defaults: HashMap<String, Value>,
    state: Arc<StateStore>,
    recovery: Arc<RecoveryManager>,
    progress: Option<Arc<ProgressTracker>>,
    logger: Option<Arc<ExecutionLogger>>,
}

impl WorkflowGraph {
    pub fn new(state: Arc<StateStore>, recovery: Arc<RecoveryManager>) -> Self {
        WorkflowGraph {
            nodes: HashMap::new(),
            skip_defaults: HashMap::new(),
            state,
            recovery,
            progress: None,
            logger: None,
        }
    }

    pub fn with_progress_tracker(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_execution_logger(mut self, logger: Arc<ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn add_node(&mut self, node: Arc<dyn GraphNode>) {
        self.nodes.insert(node.id().to_string(), node);
    }

    /// Register the output this node should be given if recovery resolves
    /// its failure with a `Skip` disposition. Without an entry here, a
    /// `Skip`-categorized failure for this node has nothing to substitute
    /// and is treated as an abort — generalizing the Python reference's
    /// hardcoded per-node-type defaults (SPEC_FULL.md §2.J).
    pub fn set_skip_default(&mut self, node_id: impl Into<String>, default_output: Value) {
        self.skip_defaults.insert(node_id.into(), default_output);
    }

    /// Run one node under recovery, returning the node's reported outcome
    /// (with a `Skip` disposition surfaced as a `Complete` outcome carrying
    /// the registered default, since there is no further node to continue
    /// into once recovery has given up retrying).
    async fn execute_node_with_recovery(&self, workflow_id: &str, node: &Arc<dyn GraphNode>) -> Result<NodeOutcome> {
        let node_id = node.id().to_string();
        let state = Arc::clone(&self.state);
        let node = Arc::clone(node);
        let skip_default = self
            .skip_defaults
            .get(&node_id)
            .cloned()
            .map(|output| NodeOutcome::Complete { output });

        let outcome = self
            .recovery
            .with_recovery(
                workflow_id,
                &node_id,
                move || {
                    let node = Arc::clone(&node);
                    let state = Arc::clone(&state);
                    async move { node.run(&state).await }
                },
                None::<fn() -> std::future::Ready<Result<NodeOutcome>>>,
                skip_default,
            )
            .await;

        match outcome {
            RecoveryOutcome::Succeeded(outcome) => Ok(outcome),
            RecoveryOutcome::Skipped(outcome) => {
                info!(workflow_id, node_id, "node skipped with registered default");
                Ok(outcome)
            }
            RecoveryOutcome::Failed(error) => Err(error),
        }
    }

    /// Walk the graph starting at `start_node_id`, following each node's
    /// self-reported successors until the frontier is empty, a node
    /// reports `Complete`, or a node's recovery-wrapped execution fails
    /// outright.
    pub async fn run_workflow(&self, workflow_id: &str, start_node_id: &str) -> WorkflowOutcome {
        let mut outputs = HashMap::new();
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(start_node_id.to_string());

        let execution_id = if let Some(logger) = &self.logger {
            Some(logger.create_execution(workflow_id, format!("graph:{start_node_id}"), &self.state).await)
        } else {
            None
        };
        if let (Some(logger), Some(execution_id)) = (&self.logger, &execution_id) {
            let _ = logger.start(execution_id).await;
        }

        let progress_id = if let Some(progress) = &self.progress {
            Some(progress.create_workflow(format!("graph:{start_node_id}"), 1.0).await)
        } else {
            None
        };

        while let Some(node_id) = frontier.pop_front() {
            if !visited.insert(node_id.clone()) {
                continue;
            }

            let node = match self.nodes.get(&node_id) {
                Some(node) => node,
                None => {
                    let error = RuntimeError::NodeNotFound { id: node_id.clone() };
                    return self
                        .finish_failed(workflow_id, &node_id, error, outputs, execution_id.as_deref())
                        .await;
                }
            };

            if let Some(logger) = &self.logger {
                if let Some(execution_id) = &execution_id {
                    let _ = logger.log_step_start(execution_id, node_id.clone());
                }
            }

            let start = std::time::Instant::now();
            match self.execute_node_with_recovery(workflow_id, node).await {
                Ok(NodeOutcome::Continue { output, next }) => {
                    if let Some(logger) = &self.logger {
                        if let Some(execution_id) = &execution_id {
                            let _ = logger.log_step_end(execution_id, &node_id, start.elapsed().as_secs_f64() * 1000.0);
                        }
                    }
                    outputs.insert(node_id.clone(), output);
                    for next_id in next {
                        if !visited.contains(&next_id) {
                            frontier.push_back(next_id);
                        }
                    }
                }
                Ok(NodeOutcome::Complete { output }) => {
                    if let Some(logger) = &self.logger {
                        if let Some(execution_id) = &execution_id {
                            let _ = logger.log_step_end(execution_id, &node_id, start.elapsed().as_secs_f64() * 1000.0);
                        }
                    }
                    outputs.insert(node_id, output);
                }
                Ok(NodeOutcome::Fail { error }) => {
                    let error = RuntimeError::Internal(error);
                    return self
                        .finish_failed(workflow_id, &node_id, error, outputs, execution_id.as_deref())
                        .await;
                }
                Err(error) => {
                    return self
                        .finish_failed(workflow_id, &node_id, error, outputs, execution_id.as_deref())
                        .await;
                }
            }

            if let Some(progress) = &self.progress {
                if let Some(progress_id) = &progress_id {
                    let fraction = (visited.len() as f64 / (visited.len() + frontier.len()).max(1) as f64) * 100.0;
                    let _ = progress.update_progress(progress_id, fraction, None).await;
                }
            }
        }

        if let Some(progress) = &self.progress {
            if let Some(progress_id) = &progress_id {
                let _ = progress.complete_item(progress_id, true).await;
            }
        }
        if let (Some(logger), Some(execution_id)) = (&self.logger, &execution_id) {
            let _ = logger.complete(execution_id, &self.state).await;
        }

        WorkflowOutcome {
            succeeded: true,
            outputs,
            failed_node: None,
            error_chain: Vec::new(),
        }
    }

    async fn finish_failed(
        &self,
        workflow_id: &str,
        node_id: &str,
        error: RuntimeError,
        outputs: HashMap<String, Value>,
        execution_id: Option<&str>,
    ) -> WorkflowOutcome {
        warn!(workflow_id, node_id, error = %error, "workflow graph run failed");
        let chain = error_chain(&error);

        if let Some(logger) = &self.logger {
            if let Some(execution_id) = execution_id {
                let _ = logger.log_error(execution_id, node_id, error.to_string(), None);
                let _ = logger.fail(execution_id, error.to_string()).await;
            }
        }

        WorkflowOutcome {
            succeeded: false,
            outputs,
            failed_node: Some(node_id.to_string()),
            error_chain: chain,
        }
    }
}

/// Walk `error.source()` into a flat list of messages, outermost first.
/// Mirrors the chain-walking already used to format persisted execution
/// failures (`engine::logging::handler`).
fn error_chain(error: &RuntimeError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checkpoint::CheckpointManager;
    use crate::engine::recovery::transaction::TransactionManager;
    use crate::engine::retry::RetryManager;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StartNode;
    #[async_trait]
    impl GraphNode for StartNode {
        fn id(&self) -> &str {
            "start"
        }
        async fn run(&self, _state: &StateStore) -> Result<NodeOutcome> {
            Ok(NodeOutcome::Continue {
                output: Value::String("started".into()),
                next: vec!["finish".to_string()],
            })
        }
    }

    struct FinishNode;
    #[async_trait]
    impl GraphNode for FinishNode {
        fn id(&self) -> &str {
            "finish"
        }
        async fn run(&self, _state: &StateStore) -> Result<NodeOutcome> {
            Ok(NodeOutcome::Complete {
                output: Value::Number(42.0),
            })
        }
    }

    struct FlakyNode {
        calls: AtomicU32,
    }
    #[async_trait]
    impl GraphNode for FlakyNode {
        fn id(&self) -> &str {
            "flaky"
        }
        async fn run(&self, _state: &StateStore) -> Result<NodeOutcome> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RuntimeError::Internal("temporarily unavailable".into()))
            } else {
                Ok(NodeOutcome::Complete { output: Value::Bool(true) })
            }
        }
    }

    struct AlwaysFailsNode;
    #[async_trait]
    impl GraphNode for AlwaysFailsNode {
        fn id(&self) -> &str {
            "doomed"
        }
        async fn run(&self, _state: &StateStore) -> Result<NodeOutcome> {
            Err(RuntimeError::Internal("assertion failed".into()))
        }
    }

    fn make_graph() -> WorkflowGraph {
        let state = StateStore::new();
        let checkpoints = Arc::new(CheckpointManager::new(Arc::clone(&state)));
        let transactions = TransactionManager::new(checkpoints);
        let retry_manager = Arc::new(RetryManager::new());
        let recovery = Arc::new(RecoveryManager::new(retry_manager, transactions));
        WorkflowGraph::new(state, recovery)
    }

    #[tokio::test]
    async fn runs_through_node_declared_successors_to_completion() {
        let mut graph = make_graph();
        graph.add_node(Arc::new(StartNode));
        graph.add_node(Arc::new(FinishNode));

        let outcome = graph.run_workflow("wf-1", "start").await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.outputs.get("start"), Some(&Value::String("started".into())));
        assert_eq!(outcome.outputs.get("finish"), Some(&Value::Number(42.0)));
    }

    #[tokio::test]
    async fn transient_node_failure_recovers_via_retry() {
        let mut graph = make_graph();
        graph.add_node(Arc::new(FlakyNode { calls: AtomicU32::new(0) }));

        let outcome = graph.run_workflow("wf-2", "flaky").await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.outputs.get("flaky"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn unrecoverable_node_failure_reports_error_chain() {
        let mut graph = make_graph();
        graph.add_node(Arc::new(AlwaysFailsNode));

        let outcome = graph.run_workflow("wf-3", "doomed").await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failed_node.as_deref(), Some("doomed"));
        assert!(!outcome.error_chain.is_empty());
    }

    #[tokio::test]
    async fn missing_node_id_fails_with_node_not_found() {
        let graph = make_graph();
        let outcome = graph.run_workflow("wf-4", "nowhere").await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failed_node.as_deref(), Some("nowhere"));
    }
}
