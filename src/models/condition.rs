// Condition evaluator data model: the token type produced by the
// tokenizer and consumed by the parser.
//
// Grounded in `original_source/core/condition_evaluator.py`'s TokenType
// and Token classes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTokenType {
    Variable,
    Number,
    String,
    Bool,
    Null,
    ComparisonOp,
    BooleanOp,
    Not,
    FunctionName,
    LeftParen,
    RightParen,
    Comma,
}

/// One lexical token produced by the condition tokenizer, carrying both
/// its classification and the raw source text (used in error messages and
/// in `ConditionEvaluator::get_trace`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionToken {
    pub token_type: ConditionTokenType,
    pub text: String,
    pub position: usize,
}

impl ConditionToken {
    pub fn new(token_type: ConditionTokenType, text: impl Into<String>, position: usize) -> Self {
        ConditionToken {
            token_type,
            text: text.into(),
            position,
        }
    }
}
