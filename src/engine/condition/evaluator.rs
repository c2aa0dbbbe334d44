// ConditionEvaluator: recursive-descent parser plus left-to-right
// evaluator over a variable map, the builtin function set, and the
// playbook-wide condition scanner.
//
// Grounded in `original_source/core/condition_evaluator.py` in full.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::models::{ConditionToken, ConditionTokenType, Value};
use crate::{Result, RuntimeError};

use super::token::{tokenize, FUNCTION_NAMES};

/// A single step recorded by [`ConditionEvaluator::get_trace`]: what was
/// evaluated and what it produced, for debugging playbook branch
/// conditions that didn't fire as expected.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub expression: String,
    pub result: Value,
}

/// A builtin function's reachable arity. Declared directly rather than
/// derived reflectively (SPEC_FULL.md §2.I's "function arity" resolution),
/// so the nominal and actual arity can never diverge the way the Python
/// reference's `__code__.co_argcount`-based introspection can for variadic
/// builtins.
enum Arity {
    Exact(usize),
    Range(usize, usize),
}

impl Arity {
    fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::Range(lo, hi) => n >= *lo && n <= *hi,
        }
    }
}

fn arity_of(function_name: &str) -> Arity {
    match function_name {
        "exists" | "is_empty" | "length" | "is_string" | "is_number" | "is_boolean" | "is_array"
        | "is_object" | "sum" | "average" | "count_items" => Arity::Exact(1),
        "contains" | "starts_with" | "ends_with" | "contains_string" | "matches_regex"
        | "has_item" | "is_greater" | "is_less" | "any_match" | "all_match" => Arity::Exact(2),
        _ => Arity::Range(0, usize::MAX),
    }
}

/// A safe, deterministic, side-effect-free boolean expression language over
/// a caller-supplied variable map. See `spec.md` §4.I for the grammar and
/// `spec.md` §9 for why evaluation is strictly left-to-right with no
/// operator precedence beyond unary `not`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        ConditionEvaluator
    }

    /// Returns `Ok(true)` iff `expression` tokenizes and parses without
    /// error; does not evaluate it. `spec.md` §8 requires this agree with
    /// whether `evaluate` would raise a `SyntaxError` (not an
    /// `EvaluationError` — a condition can be syntactically valid and still
    /// fail to evaluate against a particular variable map).
    pub fn validate_syntax(&self, expression: &str) -> bool {
        let tokens = match tokenize(expression) {
            Ok(tokens) => tokens,
            Err(_) => return false,
        };
        Parser::new(&tokens).parse_to_end().is_ok()
    }

    /// Evaluate `expression` against `variables`. Unresolved variables are
    /// `Value::Null` (falsy), matching the Python reference.
    pub fn evaluate(&self, expression: &str, variables: &HashMap<String, Value>) -> Result<Value> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_to_end()?;
        eval_node(&ast, variables)
    }

    /// Evaluate `expression` and report the boolean truthiness the way a
    /// playbook branch/handoff condition consumes it.
    pub fn evaluate_bool(&self, expression: &str, variables: &HashMap<String, Value>) -> Result<bool> {
        Ok(self.evaluate(expression, variables)?.is_truthy())
    }

    /// Static analysis: every variable token referenced by `expression`,
    /// without evaluating it. `spec.md` §8 requires this be a superset of
    /// the variable names actually used.
    pub fn get_referenced_variables(&self, expression: &str) -> Result<HashSet<String>> {
        let tokens = tokenize(expression)?;
        Ok(tokens
            .iter()
            .filter(|t| t.token_type == ConditionTokenType::Variable)
            .map(|t| t.text.clone())
            .collect())
    }

    /// Re-evaluate `expression` bottom-up, recording each subexpression's
    /// value, for debugging why a playbook branch took the path it did.
    pub fn get_trace(&self, expression: &str, variables: &HashMap<String, Value>) -> Result<Vec<TraceStep>> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_to_end()?;
        let mut trace = Vec::new();
        trace_node(&ast, variables, &mut trace)?;
        Ok(trace)
    }

    /// Scan a caller-supplied list of condition strings (the playbook
    /// loader itself is out of `spec.md`'s scope, so this takes raw
    /// strings rather than a playbook object) and return every referenced
    /// variable plus any syntax errors encountered, each tagged by the
    /// offending expression.
    pub fn analyze_conditions(&self, expressions: &[String]) -> (HashSet<String>, Vec<(String, String)>) {
        let mut variables = HashSet::new();
        let mut errors = Vec::new();
        for expression in expressions {
            match self.get_referenced_variables(expression) {
                Ok(found) => variables.extend(found),
                Err(error) => errors.push((expression.clone(), error.to_string())),
            }
        }
        (variables, errors)
    }

    /// Suggest the closest known function/operator name to `unknown`, for
    /// syntax error messages (Levenshtein distance, SPEC_FULL.md §2.I).
    pub fn suggest(&self, unknown: &str) -> Option<String> {
        let candidates: Vec<&str> = FUNCTION_NAMES
            .iter()
            .copied()
            .chain(["and", "or", "not", "true", "false", "null"])
            .collect();
        candidates
            .into_iter()
            .map(|candidate| (candidate, levenshtein(unknown, candidate)))
            .min_by_key(|(_, distance)| *distance)
            .filter(|(_, distance)| *distance <= 3)
            .map(|(candidate, _)| candidate.to_string())
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let current = row[j];
            row[j] = (row[j] + 1).min(row[j - 1] + 1).min(prev + cost);
            prev = current;
        }
    }
    row[b.len()]
}

// --- AST --------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Variable(String),
    Not(Box<Node>),
    BinaryOp {
        left: Box<Node>,
        op: String,
        right: Box<Node>,
    },
    Call {
        name: String,
        args: Vec<Node>,
    },
}

// --- Parser: recursive descent, left-to-right, no precedence beyond
// unary `not` (spec.md §4.I / §9). -------------------------------------

struct Parser<'a> {
    tokens: &'a [ConditionToken],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [ConditionToken]) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&ConditionToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&ConditionToken> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn parse_to_end(&mut self) -> Result<Node> {
        if self.tokens.is_empty() {
            return Err(RuntimeError::ConditionSyntax {
                message: "empty expression".to_string(),
                suggestion: None,
            });
        }
        let expr = self.parse_expr()?;
        if self.pos != self.tokens.len() {
            let token = &self.tokens[self.pos];
            return Err(RuntimeError::ConditionSyntax {
                message: format!("unexpected token '{}' at position {}", token.text, token.position),
                suggestion: None,
            });
        }
        Ok(expr)
    }

    /// `expr := term (op term)*`, left-to-right, no precedence grouping
    /// (`a and b or c` parses as `((a and b) or c)`).
    fn parse_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.token_type == ConditionTokenType::ComparisonOp || t.token_type == ConditionTokenType::BooleanOp => {
                    t.text.to_lowercase()
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Node::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// `unary := 'not' term`
    /// `term  := literal | variable | '(' expr ')' | call`
    fn parse_term(&mut self) -> Result<Node> {
        let token = self.peek().cloned().ok_or_else(|| RuntimeError::ConditionSyntax {
            message: "unexpected end of expression".to_string(),
            suggestion: None,
        })?;

        match token.token_type {
            ConditionTokenType::Not => {
                self.advance();
                let operand = self.parse_term()?;
                Ok(Node::Not(Box::new(operand)))
            }
            ConditionTokenType::LeftParen => {
                self.advance();
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(t) if t.token_type == ConditionTokenType::RightParen => Ok(inner),
                    _ => Err(RuntimeError::ConditionSyntax {
                        message: format!("expected ')' to close '(' at position {}", token.position),
                        suggestion: Some("add a closing parenthesis".to_string()),
                    }),
                }
            }
            ConditionTokenType::Number => {
                self.advance();
                let n: f64 = token.text.parse().map_err(|_| RuntimeError::ConditionSyntax {
                    message: format!("invalid number literal '{}'", token.text),
                    suggestion: None,
                })?;
                Ok(Node::Literal(Value::Number(n)))
            }
            ConditionTokenType::String => {
                self.advance();
                Ok(Node::Literal(Value::String(token.text.clone())))
            }
            ConditionTokenType::Bool => {
                self.advance();
                Ok(Node::Literal(Value::Bool(token.text.to_lowercase() == "true")))
            }
            ConditionTokenType::Null => {
                self.advance();
                Ok(Node::Literal(Value::Null))
            }
            ConditionTokenType::Variable => {
                self.advance();
                Ok(Node::Variable(token.text.clone()))
            }
            ConditionTokenType::FunctionName => {
                self.advance();
                self.expect(ConditionTokenType::LeftParen, "(")?;
                let mut args = Vec::new();
                if self.peek().map(|t| t.token_type) != Some(ConditionTokenType::RightParen) {
                    args.push(self.parse_expr()?);
                    while self.peek().map(|t| t.token_type) == Some(ConditionTokenType::Comma) {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(ConditionTokenType::RightParen, ")")?;
                Ok(Node::Call {
                    name: token.text.to_lowercase(),
                    args,
                })
            }
            _ => Err(RuntimeError::ConditionSyntax {
                message: format!("unexpected token '{}' at position {}", token.text, token.position),
                suggestion: None,
            }),
        }
    }

    fn expect(&mut self, token_type: ConditionTokenType, symbol: &str) -> Result<()> {
        match self.advance() {
            Some(t) if t.token_type == token_type => Ok(()),
            Some(t) => Err(RuntimeError::ConditionSyntax {
                message: format!("expected '{symbol}' but found '{}' at position {}", t.text, t.position),
                suggestion: None,
            }),
            None => Err(RuntimeError::ConditionSyntax {
                message: format!("expected '{symbol}' but reached end of expression"),
                suggestion: None,
            }),
        }
    }
}

// --- Evaluator ----------------------------------------------------------

fn eval_node(node: &Node, variables: &HashMap<String, Value>) -> Result<Value> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Variable(name) => Ok(variables.get(name).cloned().unwrap_or(Value::Null)),
        Node::Not(inner) => Ok(Value::Bool(!eval_node(inner, variables)?.is_truthy())),
        Node::BinaryOp { left, op, right } => eval_binary(left, op, right, variables),
        Node::Call { name, args } => eval_call(name, args, variables),
    }
}

fn eval_binary(left: &Node, op: &str, right: &Node, variables: &HashMap<String, Value>) -> Result<Value> {
    match op {
        // Short-circuit Python-like truthiness: `and`/`or` return one of
        // their operands' values, not necessarily a bool, matching
        // `spec.md` §4.I's "type mismatches propagate through Python-like
        // truthiness".
        "and" => {
            let l = eval_node(left, variables)?;
            if !l.is_truthy() {
                return Ok(l);
            }
            eval_node(right, variables)
        }
        "or" => {
            let l = eval_node(left, variables)?;
            if l.is_truthy() {
                return Ok(l);
            }
            eval_node(right, variables)
        }
        "==" | "!=" | ">" | "<" | ">=" | "<=" => {
            let l = eval_node(left, variables)?;
            let r = eval_node(right, variables)?;
            compare(op, &l, &r)
        }
        other => Err(RuntimeError::ConditionEvaluation {
            message: format!("unknown operator '{other}'"),
        }),
    }
}

fn compare(op: &str, l: &Value, r: &Value) -> Result<Value> {
    if op == "==" {
        return Ok(Value::Bool(values_equal(l, r)));
    }
    if op == "!=" {
        return Ok(Value::Bool(!values_equal(l, r)));
    }
    // Ordering comparisons require comparable operands (`spec.md` §4.I).
    let (lf, rf) = match (l.as_f64(), r.as_f64()) {
        (Some(lf), Some(rf)) => (lf, rf),
        _ => {
            return Err(RuntimeError::ConditionEvaluation {
                message: format!("cannot compare {} and {} with '{op}'", l.type_name(), r.type_name()),
            })
        }
    };
    let result = match op {
        ">" => lf > rf,
        "<" => lf < rf,
        ">=" => lf >= rf,
        "<=" => lf <= rf,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => (a - b).abs() < f64::EPSILON,
        _ => l == r,
    }
}

fn eval_call(name: &str, args: &[Node], variables: &HashMap<String, Value>) -> Result<Value> {
    let arity = arity_of(name);
    if !arity.accepts(args.len()) {
        return Err(RuntimeError::ConditionEvaluation {
            message: format!("function '{name}' called with {} argument(s)", args.len()),
        });
    }
    let values: Vec<Value> = args
        .iter()
        .map(|arg| eval_node(arg, variables))
        .collect::<Result<_>>()?;

    let result = match name {
        "exists" => Value::Bool(!matches!(values[0], Value::Null)),
        "is_empty" => Value::Bool(is_empty(&values[0])),
        "length" => Value::Number(length_of(&values[0]) as f64),
        "contains" => Value::Bool(contains(&values[0], &values[1])),
        "starts_with" => Value::Bool(values[0].as_str().zip(values[1].as_str()).map(|(s, p)| s.starts_with(p)).unwrap_or(false)),
        "ends_with" => Value::Bool(values[0].as_str().zip(values[1].as_str()).map(|(s, p)| s.ends_with(p)).unwrap_or(false)),
        "contains_string" => Value::Bool(values[0].as_str().zip(values[1].as_str()).map(|(s, sub)| s.contains(sub)).unwrap_or(false)),
        "matches_regex" => {
            let pattern = values[1].as_str().unwrap_or_default();
            let haystack = values[0].as_str().unwrap_or_default();
            Value::Bool(Regex::new(pattern).map(|re| re.is_match(haystack)).unwrap_or(false))
        }
        "any_match" => Value::Bool(values[0].as_list().map(|items| items.iter().any(|v| values_equal(v, &values[1]))).unwrap_or(false)),
        "all_match" => Value::Bool(values[0].as_list().map(|items| !items.is_empty() && items.iter().all(|v| values_equal(v, &values[1]))).unwrap_or(false)),
        "has_item" => Value::Bool(values[0].as_list().map(|items| items.iter().any(|v| values_equal(v, &values[1]))).unwrap_or(false)),
        "count_items" => Value::Number(length_of(&values[0]) as f64),
        "is_string" => Value::Bool(matches!(values[0], Value::String(_))),
        "is_number" => Value::Bool(matches!(values[0], Value::Number(_))),
        "is_boolean" => Value::Bool(matches!(values[0], Value::Bool(_))),
        "is_array" => Value::Bool(matches!(values[0], Value::List(_))),
        "is_object" => Value::Bool(matches!(values[0], Value::Map(_))),
        "is_greater" => Value::Bool(values[0].as_f64().zip(values[1].as_f64()).map(|(a, b)| a > b).unwrap_or(false)),
        "is_less" => Value::Bool(values[0].as_f64().zip(values[1].as_f64()).map(|(a, b)| a < b).unwrap_or(false)),
        "sum" => Value::Number(values[0].as_list().map(|items| items.iter().filter_map(|v| v.as_f64()).sum()).unwrap_or(0.0)),
        "average" => {
            let items = values[0].as_list().unwrap_or(&[]);
            let nums: Vec<f64> = items.iter().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                Value::Number(0.0)
            } else {
                Value::Number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        other => {
            return Err(RuntimeError::ConditionEvaluation {
                message: format!("unknown function '{other}'"),
            })
        }
    };
    Ok(result)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    }
}

fn length_of(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Null => 0,
        _ => 0,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|v| values_equal(v, needle)),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Map(map) => needle.as_str().map(|k| map.contains_key(k)).unwrap_or(false),
        _ => false,
    }
}

fn trace_node(node: &Node, variables: &HashMap<String, Value>, trace: &mut Vec<TraceStep>) -> Result<Value> {
    let result = match node {
        Node::Literal(v) => v.clone(),
        Node::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        Node::Not(inner) => {
            let inner_value = trace_node(inner, variables, trace)?;
            Value::Bool(!inner_value.is_truthy())
        }
        Node::BinaryOp { left, op, right } => {
            trace_node(left, variables, trace)?;
            trace_node(right, variables, trace)?;
            eval_binary(left, op, right, variables)?
        }
        Node::Call { name, args } => {
            for arg in args {
                trace_node(arg, variables, trace)?;
            }
            eval_call(name, args, variables)?
        }
    };
    trace.push(TraceStep {
        expression: describe(node),
        result: result.clone(),
    });
    Ok(result)
}

fn describe(node: &Node) -> String {
    match node {
        Node::Literal(v) => v.to_string(),
        Node::Variable(name) => name.clone(),
        Node::Not(inner) => format!("not {}", describe(inner)),
        Node::BinaryOp { left, op, right } => format!("{} {op} {}", describe(left), describe(right)),
        Node::Call { name, args } => format!("{name}({})", args.iter().map(describe).collect::<Vec<_>>().join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn literal_true_and_not_false() {
        let evaluator = ConditionEvaluator::new();
        assert_eq!(evaluator.evaluate("true", &HashMap::new()).unwrap(), Value::Bool(true));
        assert_eq!(evaluator.evaluate("not false", &HashMap::new()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn contains_and_length_scenario_from_spec() {
        let evaluator = ConditionEvaluator::new();
        let variables = vars(&[
            ("tags", Value::List(vec![Value::from("urgent"), Value::from("new")])),
            ("items", Value::List(vec![Value::Number(1.0), Value::Number(2.0)])),
        ]);
        let result = evaluator
            .evaluate_bool("contains(tags, \"urgent\") and length(items) > 0", &variables)
            .unwrap();
        assert!(result);

        let mut empty_items = variables.clone();
        empty_items.insert("items".to_string(), Value::List(vec![]));
        let result = evaluator
            .evaluate_bool("contains(tags, \"urgent\") and length(items) > 0", &empty_items)
            .unwrap();
        assert!(!result);
    }

    #[test]
    fn left_to_right_evaluation_has_no_and_over_or_precedence() {
        // false and false or true == ((false and false) or true) == true,
        // not `false and (false or true)` which would also be true here,
        // so use a case that distinguishes the two groupings.
        let evaluator = ConditionEvaluator::new();
        // true or false and false:
        // left-to-right: (true or false) and false == false
        // precedence-respecting: true or (false and false) == true
        let result = evaluator.evaluate_bool("true or false and false", &HashMap::new()).unwrap();
        assert!(!result, "left-to-right grouping must win over conventional precedence");
    }

    #[test]
    fn unresolved_variable_is_null_and_falsy() {
        let evaluator = ConditionEvaluator::new();
        let result = evaluator.evaluate("missing_var", &HashMap::new()).unwrap();
        assert_eq!(result, Value::Null);
        assert!(!result.is_truthy());
    }

    #[test]
    fn ordering_comparison_on_incomparable_types_is_an_evaluation_error() {
        let evaluator = ConditionEvaluator::new();
        let variables = vars(&[("x", Value::List(vec![]))]);
        let err = evaluator.evaluate("x > 5", &variables).unwrap_err();
        assert!(matches!(err, RuntimeError::ConditionEvaluation { .. }));
    }

    #[test]
    fn validate_syntax_agrees_with_syntax_error_outcomes() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.validate_syntax("length(x) > 0"));
        assert!(!evaluator.validate_syntax("length(x >"));
    }

    #[test]
    fn get_referenced_variables_is_a_superset_of_used_names() {
        let evaluator = ConditionEvaluator::new();
        let found = evaluator.get_referenced_variables("a > 0 and contains(b, c)").unwrap();
        assert!(found.contains("a"));
        assert!(found.contains("b"));
        assert!(found.contains("c"));
    }

    #[test]
    fn analyze_conditions_collects_variables_and_errors_across_expressions() {
        let evaluator = ConditionEvaluator::new();
        let expressions = vec!["a > 0".to_string(), "b ==".to_string()];
        let (variables, errors) = evaluator.analyze_conditions(&expressions);
        assert!(variables.contains("a"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "b ==");
    }

    #[test]
    fn suggest_finds_the_closest_known_name() {
        let evaluator = ConditionEvaluator::new();
        assert_eq!(evaluator.suggest("contian"), Some("contains".to_string()));
    }
}
