// Workflow Execution Runtime Engine
// This contains the execution engines that power a resumable, recoverable
// workflow run: state, checkpoints, retries, recovery, progress, logging,
// streaming, condition evaluation, and graph execution.

//! # Engine Module
//!
//! The engine is the layer between the shared data model (`models/`) and a
//! caller embedding this runtime. Each submodule below restates one
//! component of SPEC_FULL.md §2; see each module's own doc comment for its
//! full contract.
//!
//! ## Module Organization Pattern
//!
//! This is the same pattern this crate uses throughout for a multi-file
//! module: a directory named after the module, a `mod.rs` declaring its
//! submodules, and `pub use` re-exports flattening the commonly-used types
//! up to `engine::`.

/// Scoped, typed variable storage with a change event feed.
pub mod state_store;

/// Point-in-time snapshots of a variable scope.
pub mod checkpoint;

/// Classifies an error into one of the categories recovery decisions key off of.
pub mod error_category;

/// Backoff strategies, circuit breakers, and named retry policies.
pub mod retry;

/// Ordered recovery strategies over transactional step execution.
pub mod recovery;

/// Hierarchical progress items with weighted rollup and ETA estimation.
pub mod progress;

/// A disk-backed, queryable execution log.
pub mod logging;

/// Chunked response streaming with progress mirroring and cancellation.
pub mod streaming;

/// The safe condition expression language.
pub mod condition;

/// Recovery-guarded execution over a directed graph of caller-defined nodes.
pub mod graph;

pub use checkpoint::CheckpointManager;
pub use condition::ConditionEvaluator;
pub use error_category::{ErrorCategorizer, ErrorCategory};
pub use graph::{GraphNode, NodeOutcome, WorkflowGraph};
pub use logging::ExecutionLogger;
pub use progress::ProgressTracker;
pub use recovery::RecoveryManager;
pub use retry::{RetryManager, RetryPolicy};
pub use state_store::StateStore;
pub use streaming::StreamingService;
