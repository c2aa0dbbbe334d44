// Condition tokenizer: turns an expression string into the
// `ConditionToken` stream the parser consumes.
//
// Grounded in `original_source/core/condition_evaluator.py`'s
// `ConditionEvaluator._tokenize` method.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::models::{ConditionToken, ConditionTokenType};
use crate::{Result, RuntimeError};

const BOOLEAN_OPERATORS: &[&str] = &["and", "or", "not"];
const BOOLEAN_LITERALS: &[&str] = &["true", "false"];
const NULL_LITERAL: &str = "null";

/// Every builtin function name the evaluator recognizes. An identifier
/// that isn't one of these, a boolean literal/operator, or `null` tokenizes
/// as a variable reference.
pub const FUNCTION_NAMES: &[&str] = &[
    "exists",
    "is_empty",
    "length",
    "contains",
    "starts_with",
    "ends_with",
    "contains_string",
    "matches_regex",
    "any_match",
    "all_match",
    "has_item",
    "count_items",
    "is_string",
    "is_number",
    "is_boolean",
    "is_array",
    "is_object",
    "is_greater",
    "is_less",
    "sum",
    "average",
];

/// Tokenization is memoized by expression text (SPEC_FULL.md §2.I /
/// `spec.md` §4.I), since the same condition string is typically
/// re-evaluated once per graph traversal across many workflow runs.
lazy_static! {
    static ref TOKEN_CACHE: Mutex<HashMap<String, Vec<ConditionToken>>> = Mutex::new(HashMap::new());
}

/// Tokenize `source`, using the memoization cache keyed by the exact
/// expression text.
pub fn tokenize(source: &str) -> Result<Vec<ConditionToken>> {
    if let Some(cached) = TOKEN_CACHE.lock().unwrap().get(source) {
        return Ok(cached.clone());
    }
    let tokens = tokenize_uncached(source)?;
    TOKEN_CACHE
        .lock()
        .unwrap()
        .insert(source.to_string(), tokens.clone());
    Ok(tokens)
}

fn tokenize_uncached(source: &str) -> Result<Vec<ConditionToken>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(ConditionToken::new(ConditionTokenType::LeftParen, "(", i));
                i += 1;
            }
            ')' => {
                tokens.push(ConditionToken::new(ConditionTokenType::RightParen, ")", i));
                i += 1;
            }
            ',' => {
                tokens.push(ConditionToken::new(ConditionTokenType::Comma, ",", i));
                i += 1;
            }
            '"' | '\'' => {
                let (text, next) = read_string(&chars, i)?;
                tokens.push(ConditionToken::new(ConditionTokenType::String, text, i));
                i = next;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, "==", i));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, "!=", i));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, ">=", i));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, "<=", i));
                i += 2;
            }
            '>' => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, ">", i));
                i += 1;
            }
            '<' => {
                tokens.push(ConditionToken::new(ConditionTokenType::ComparisonOp, "<", i));
                i += 1;
            }
            '-' if chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                let (text, next) = read_number(&chars, i);
                tokens.push(ConditionToken::new(ConditionTokenType::Number, text, i));
                i = next;
            }
            _ if c.is_ascii_digit() => {
                let (text, next) = read_number(&chars, i);
                tokens.push(ConditionToken::new(ConditionTokenType::Number, text, i));
                i = next;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let (text, next) = read_identifier(&chars, i);
                let lower = text.to_lowercase();
                let token_type = if lower == "not" {
                    ConditionTokenType::Not
                } else if BOOLEAN_OPERATORS.contains(&lower.as_str()) {
                    ConditionTokenType::BooleanOp
                } else if BOOLEAN_LITERALS.contains(&lower.as_str()) {
                    ConditionTokenType::Bool
                } else if lower == NULL_LITERAL {
                    ConditionTokenType::Null
                } else if FUNCTION_NAMES.contains(&lower.as_str()) {
                    ConditionTokenType::FunctionName
                } else {
                    ConditionTokenType::Variable
                };
                tokens.push(ConditionToken::new(token_type, text, i));
                i = next;
            }
            _ => {
                return Err(RuntimeError::ConditionSyntax {
                    message: format!("unexpected character '{c}' at position {i}"),
                    suggestion: None,
                });
            }
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut text = String::new();
    while i < chars.len() && chars[i] != quote {
        text.push(chars[i]);
        i += 1;
    }
    if i >= chars.len() {
        return Err(RuntimeError::ConditionSyntax {
            message: format!("unterminated string literal starting at position {start}"),
            suggestion: Some("close the string with a matching quote".to_string()),
        });
    }
    Ok((text, i + 1))
}

fn read_number(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut text = String::new();
    if chars[i] == '-' {
        text.push('-');
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        text.push(chars[i]);
        i += 1;
    }
    if chars.get(i) == Some(&'.') && chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
        text.push('.');
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            text.push(chars[i]);
            i += 1;
        }
    }
    (text, i)
}

fn read_identifier(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut text = String::new();
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        text.push(chars[i]);
        i += 1;
    }
    (text, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_comparison_and_boolean_expression() {
        let tokens = tokenize("contains(tags, \"urgent\") and length(items) > 0").unwrap();
        let types: Vec<ConditionTokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                ConditionTokenType::FunctionName,
                ConditionTokenType::LeftParen,
                ConditionTokenType::Variable,
                ConditionTokenType::Comma,
                ConditionTokenType::String,
                ConditionTokenType::RightParen,
                ConditionTokenType::BooleanOp,
                ConditionTokenType::FunctionName,
                ConditionTokenType::LeftParen,
                ConditionTokenType::Variable,
                ConditionTokenType::RightParen,
                ConditionTokenType::ComparisonOp,
                ConditionTokenType::Number,
            ]
        );
    }

    #[test]
    fn negative_numbers_tokenize_as_one_token() {
        let tokens = tokenize("x > -5.5").unwrap();
        assert_eq!(tokens[2].token_type, ConditionTokenType::Number);
        assert_eq!(tokens[2].text, "-5.5");
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("x == \"oops").unwrap_err();
        assert!(matches!(err, RuntimeError::ConditionSyntax { .. }));
    }

    #[test]
    fn unrecognized_character_is_a_syntax_error() {
        let err = tokenize("x == @").unwrap_err();
        assert!(matches!(err, RuntimeError::ConditionSyntax { .. }));
    }
}
