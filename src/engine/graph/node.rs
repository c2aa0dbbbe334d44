// GraphNode: the trait caller-defined workflow steps implement, and the
// outcome they report back to the executor.
//
// Grounded in `original_source/core/graph_workflow.py`'s node classes as a
// generic pattern (not its specific 5-node example graph), and in this
// crate's own `#[async_trait::async_trait]` usage for its storage
// abstraction.

use async_trait::async_trait;

use crate::engine::state_store::StateStore;
use crate::models::Value;
use crate::Result;

/// What a node reports back to the executor after running.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The node produced `output` and the workflow should continue into
    /// each node id in `next` (the node itself decides its successors,
    /// e.g. based on a condition over its own output — see
    /// `GraphNode::run`'s doc comment).
    Continue { output: Value, next: Vec<String> },
    /// The node produced `output` and the workflow is done.
    Complete { output: Value },
    /// The node could not produce a usable output; `error` is surfaced to
    /// the caller if no recovery strategy resolves it.
    Fail { error: String },
}

/// One step in a [`super::workflow::WorkflowGraph`]. Implementors read and
/// write workflow variables through the shared [`StateStore`] rather than
/// through a private struct field, matching how every other engine module
/// in this crate shares state (SPEC_FULL.md §2.A).
///
/// A node decides its own successors dynamically through the `next` ids in
/// `NodeOutcome::Continue`, rather than the graph imposing a fixed edge
/// list — this is what lets a node branch conditionally (e.g. using the
/// [`crate::ConditionEvaluator`] over variables it just wrote) without the
/// executor needing to know anything about branch predicates.
#[async_trait]
pub trait GraphNode: Send + Sync {
    /// Unique id within a [`super::workflow::WorkflowGraph`]; used for
    /// checkpoint/recovery bookkeeping and to look up a caller-registered
    /// skip default.
    fn id(&self) -> &str;

    async fn run(&self, state: &StateStore) -> Result<NodeOutcome>;
}
