// Condition Evaluator: a safe boolean expression language for playbook
// branch and handoff conditions.
//
// Grounded in `original_source/core/condition_evaluator.py` in full.

//! # Condition Evaluator
//!
//! Branch and handoff steps in a playbook gate on a small expression
//! language over the workflow's state variables: comparisons, `and`/`or`/
//! `not`, and a fixed set of builtin functions (`contains`, `length`,
//! `matches_regex`, ...). [`token`] tokenizes (memoized), [`evaluator`]
//! parses and evaluates left-to-right with no operator precedence beyond
//! unary `not` — see `spec.md` §4.I / §9 for why. See SPEC_FULL.md §2.I.

pub mod evaluator;
pub mod token;

pub use evaluator::{ConditionEvaluator, TraceStep};
