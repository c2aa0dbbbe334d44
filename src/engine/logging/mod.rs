// Execution Logger: a typed, disk-persisted audit trail per workflow
// execution, with aggregate metrics and a background duration/memory
// watchdog.
//
// Grounded in `original_source/core/execution_logger.py` in full.

//! # Execution Logger
//!
//! Every workflow run gets one [`crate::models::ExecutionRecord`]: a typed
//! event log plus running aggregates (step timings, token/cost counters,
//! agents/tools used). [`logger::ExecutionLogger`] owns the active-record
//! table and correlates each execution with a Progress Tracker workflow
//! item; [`handler::ExecutionLogHandler`] owns disk persistence and query.
//! See SPEC_FULL.md §2.G for the full module contract.

pub mod handler;
pub mod logger;
pub mod record;

pub use handler::{ExecutionLogHandler, ExecutionMetrics, ExecutionQuery};
pub use logger::ExecutionLogger;
