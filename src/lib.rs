// Workflow Runtime - Rust Edition
// A resumable, recoverable workflow execution runtime with checkpointed
// state, categorized retries, and live progress/streaming observability.

//! # Workflow Runtime
//!
//! This is the main library crate for the workflow execution runtime. It owns
//! the state backing a running workflow, the recovery policy applied when a
//! step misbehaves, and the channels through which callers observe progress.
//!
//! ## Core Components
//!
//! - [`engine::state_store`]: typed, scoped variable storage with a change
//!   event feed ([`StateStore`]).
//! - [`engine::checkpoint`]: point-in-time snapshots of a variable scope
//!   ([`CheckpointManager`]).
//! - [`engine::error_category`]: classifies an error into one of nine
//!   categories that downstream recovery decisions key off of
//!   ([`ErrorCategorizer`]).
//! - [`engine::retry`]: backoff strategies, circuit breakers, and named retry
//!   policies ([`RetryManager`]).
//! - [`engine::recovery`]: ordered recovery strategies and transactional
//!   step execution ([`RecoveryManager`]).
//! - [`engine::progress`]: hierarchical progress items with weighted rollup
//!   and ETA estimation ([`ProgressTracker`]).
//! - [`engine::logging`]: a disk-backed, queryable execution log
//!   ([`ExecutionLogger`]).
//! - [`engine::streaming`]: chunked response streaming with cancellation
//!   ([`StreamingService`]).
//! - [`engine::condition`]: the safe condition expression language
//!   ([`ConditionEvaluator`]).
//! - [`engine::graph`]: recovery-guarded execution over a directed graph of
//!   caller-defined nodes ([`WorkflowGraph`]).
//!
//! ## Rust Learning Notes:
//!
//! ### Module System
//! Rust organizes code into modules. Each `mod` declaration tells Rust to
//! include code from either a `.rs` file or a directory with a `mod.rs` file.
//!
//! ### Public vs Private
//! - `pub mod` makes modules accessible to external crates
//! - `mod` (without pub) makes modules only accessible within this crate
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the
//! internal module structure. Instead of
//! `use workflow_runtime::engine::state_store::StateStore`, users can write
//! `use workflow_runtime::StateStore`.

// Shared data model types (Variable, Checkpoint, ExecutionRecord, ...)
pub mod models;

// Engine implementations: state, checkpoints, retry, recovery, progress,
// logging, streaming, condition evaluation, and graph execution.
pub mod engine;

// Configuration layer (file + environment, layered via the `config` crate).
pub mod config;

pub use models::{
    ChangeEventKind, Checkpoint, CheckpointType, ConditionToken, ExecutionRecord,
    ProgressItemState, RetryPolicyConfig, StateChangeEvent, StateScope, Value, Variable,
    VariableGroup,
};

pub use engine::checkpoint::CheckpointManager;
pub use engine::condition::ConditionEvaluator;
pub use engine::error_category::{ErrorCategorizer, ErrorCategory};
pub use engine::graph::{GraphNode, NodeOutcome, WorkflowGraph};
pub use engine::logging::ExecutionLogger;
pub use engine::progress::ProgressTracker;
pub use engine::recovery::RecoveryManager;
pub use engine::retry::{RetryManager, RetryPolicy};
pub use engine::state_store::StateStore;
pub use engine::streaming::StreamingService;

// Core error types
// Using the `thiserror` crate to make error handling easier, same convention
// every other engine module in this crate follows.
use thiserror::Error;

/// Custom error types for workflow runtime operations
///
/// ## Rust Learning Notes:
///
/// ### Error Handling in Rust
/// Rust doesn't have exceptions. Instead, it uses `Result<T, E>` types where:
/// - `Ok(value)` represents success
/// - `Err(error)` represents failure
///
/// ### The `thiserror` Crate
/// This crate provides macros to make error types easier to write:
/// - `#[derive(Error)]` implements the `std::error::Error` trait
/// - `#[error("...")]` provides human-readable error messages
/// - `{field}` in error messages allows string interpolation
/// - `#[from]` enables automatic conversion from other error types
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A variable was read or assigned that does not exist in the store.
    #[error("variable not found: {name}")]
    VariableNotFound { name: String },

    /// A variable write was attempted against a scope/permission it doesn't hold.
    #[error("access denied for variable {name} in scope {scope}")]
    VariableAccessDenied { name: String, scope: String },

    /// A variable value failed type or constraint validation.
    #[error("validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// A checkpoint id was requested that does not exist on disk or in memory.
    #[error("checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    /// The condition parser rejected a malformed expression.
    #[error("condition syntax error: {message}")]
    ConditionSyntax {
        message: String,
        suggestion: Option<String>,
    },

    /// A condition parsed but failed during evaluation (unknown variable, wrong arity, etc).
    #[error("condition evaluation error: {message}")]
    ConditionEvaluation { message: String },

    /// A step's recovery strategies were all exhausted without success.
    #[error("recovery exhausted for step {step} after {attempts} attempt(s)")]
    RecoveryExhausted { step: String, attempts: u32 },

    /// A circuit breaker rejected a call because it is currently open.
    #[error("circuit breaker open: {name}")]
    CircuitOpen { name: String },

    /// A stream id was requested that is not currently registered.
    #[error("stream not found: {id}")]
    StreamNotFound { id: String },

    /// A graph node was referenced that is not part of the workflow graph.
    #[error("graph node not found: {id}")]
    NodeNotFound { id: String },

    /// Checkpoint, execution log, or progress file persistence failed.
    /// Uses `anyhow::Error` for flexible error handling across filesystem
    /// and (de)serialization failure modes.
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal/unexpected error that doesn't fit another category.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
///
/// ## Rust Learning Notes:
///
/// ### Type Aliases
/// This creates a shorthand for a commonly-used type. Instead of writing
/// `std::result::Result<Variable, RuntimeError>` everywhere, we can just
/// write `Result<Variable>`.
pub type Result<T> = std::result::Result<T, RuntimeError>;
