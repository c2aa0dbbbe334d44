// Core data models for the workflow runtime.
// These are the shared types every engine module builds on.

//! # Data Models Module
//!
//! This module contains the shared data model types for the workflow
//! runtime: state variables, checkpoints, retry policies, progress items,
//! execution records, and condition tokens.
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization
//! This `mod.rs` file serves as the **module root** for the `models`
//! directory. When you have a directory with a `mod.rs` file, Rust treats
//! the directory as a module, and `mod.rs` acts as the entry point.
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements below create a flat API. Users can import
//! `use workflow_runtime::models::Variable` instead of
//! `use workflow_runtime::models::variable::Variable`.

pub mod checkpoint;
pub mod condition;
pub mod execution;
pub mod progress;
pub mod retry;
pub mod step;
pub mod value;
pub mod variable;

pub use checkpoint::{Checkpoint, CheckpointType};
pub use condition::{ConditionToken, ConditionTokenType};
pub use execution::{
    ExecutionAggregates, ExecutionErrorEntry, ExecutionEvent, ExecutionRecord, ExecutionStatus,
    ExecutionStep, ExecutionStepType, LogLevel,
};
pub use progress::{ProgressEvent, ProgressItemState, ProgressItemType, ProgressStatus};
pub use retry::{BackoffStrategy, RetryPolicyConfig, StepRetryContext};
pub use step::PlaybookStep;
pub use value::Value;
pub use variable::{
    ChangeEventKind, StateChangeEvent, StatePermission, StateScope, Variable, VariableGroup,
    VariableMeta,
};
