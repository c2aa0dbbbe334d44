// Graph Workflow: node-decided dynamic traversal over a set of steps, with
// each step's execution routed through the Recovery Manager.
//
// Grounded in `original_source/core/graph_workflow.py`, generalized away
// from its specific 5-node fan-in example and third-party graph library
// dependency per SPEC_FULL.md §2.J — see `workflow.rs`'s module doc.

//! # Graph Workflow
//!
//! A [`WorkflowGraph`] holds a registry of [`GraphNode`]s and runs them
//! starting from an entry node, following each node's own reported
//! successor ids rather than a statically declared edge list. See
//! SPEC_FULL.md §2.J for the full module contract.

pub mod node;
pub mod workflow;

pub use node::{GraphNode, NodeOutcome};
pub use workflow::{WorkflowGraph, WorkflowOutcome};
