//! Sandboxed expression evaluation.
//!
//! Formula text reaches this module after shortcode substitution, so it only
//! contains number and string literals, the four arithmetic operators,
//! parentheses and calls to a fixed set of functions. Anything else is a
//! parse error; there is no way to reach code outside the grammar.

mod lexer;
mod parser;

use std::fmt;

use heatcalc_model::FieldValue;
use thiserror::Error;

use crate::format::round_half_away;
use parser::{BinaryOp, Expr, Function};

/// Largest precision accepted by `round(x, n)`.
const MAX_ROUND_DIGITS: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("formula is empty")]
    Empty,
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("invalid number '{literal}' at position {position}")]
    InvalidNumber { literal: String, position: usize },
    #[error("unterminated string starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("unexpected '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("formula nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("formula has more than {limit} operators")]
    TooManyOperators { limit: usize },
    #[error("expected a number, found text \"{0}\"")]
    NotANumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("round() precision must be a whole number between -15 and 15, got {0}")]
    InvalidPrecision(f64),
}

/// Result of evaluating a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Text(value) => heatcalc_model::parse_number(value),
        }
    }

    fn expect_number(&self) -> Result<f64, EvalError> {
        self.as_number()
            .ok_or_else(|| EvalError::NotANumber(self.to_string()))
    }

    fn into_text(self) -> String {
        match self {
            Value::Number(value) => value.to_string(),
            Value::Text(value) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(number) => FieldValue::Number(number),
            Value::Text(text) => FieldValue::Text(text),
        }
    }
}

/// Evaluate substituted formula text.
///
/// # Errors
///
/// Returns an [`EvalError`] for malformed text, unknown functions, type
/// mismatches, division by zero and non-finite results.
pub fn evaluate(formula: &str) -> Result<Value, EvalError> {
    let tokens = lexer::tokenize(formula)?;
    let expr = parser::parse(tokens)?;
    let value = eval_expr(&expr)?;
    if let Value::Number(number) = value {
        finite(number)?;
    }
    Ok(value)
}

fn finite(value: f64) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

fn eval_expr(expr: &Expr) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(value) => Ok(Value::Number(*value)),
        Expr::Text(value) => Ok(Value::Text(value.clone())),
        Expr::Negate(inner) => {
            let value = eval_expr(inner)?.expect_number()?;
            Ok(Value::Number(-value))
        }
        Expr::Binary { op, left, right } => {
            let left = eval_expr(left)?;
            let right = eval_expr(right)?;
            eval_binary(*op, left, right)
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(eval_expr)
                .collect::<Result<Vec<_>, _>>()?;
            eval_call(*function, values)
        }
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    // `+` concatenates as soon as one side is non-numeric text.
    if op == BinaryOp::Add && (left.as_number().is_none() || right.as_number().is_none()) {
        let mut text = left.into_text();
        text.push_str(&right.into_text());
        return Ok(Value::Text(text));
    }
    let left = left.expect_number()?;
    let right = right.expect_number()?;
    let result = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div => {
            if right == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            left / right
        }
    };
    finite(result).map(Value::Number)
}

fn eval_call(function: Function, args: Vec<Value>) -> Result<Value, EvalError> {
    match function {
        Function::Round => {
            let value = args[0].expect_number()?;
            let digits = match args.get(1) {
                Some(arg) => arg.expect_number()?,
                None => 0.0,
            };
            if digits.fract() != 0.0 || digits.abs() > MAX_ROUND_DIGITS {
                return Err(EvalError::InvalidPrecision(digits));
            }
            Ok(Value::Number(round_to(value, digits as i32)?))
        }
        Function::Ceil => Ok(Value::Number(args[0].expect_number()?.ceil())),
        Function::Floor => Ok(Value::Number(args[0].expect_number()?.floor())),
        Function::Abs => Ok(Value::Number(args[0].expect_number()?.abs())),
        Function::Min | Function::Max => {
            let mut numbers = args.iter().map(Value::expect_number);
            let first = numbers.next().ok_or(EvalError::Arity {
                function: function.name(),
                expected: "at least 1",
                found: 0,
            })??;
            let mut result = first;
            for number in numbers {
                let number = number?;
                result = if function == Function::Min {
                    result.min(number)
                } else {
                    result.max(number)
                };
            }
            Ok(Value::Number(result))
        }
        Function::Concat => Ok(Value::Text(
            args.into_iter().map(Value::into_text).collect(),
        )),
        Function::Uppercase => Ok(Value::Text(args[0].to_string().to_uppercase())),
        Function::Lowercase => Ok(Value::Text(args[0].to_string().to_lowercase())),
    }
}

fn round_to(value: f64, digits: i32) -> Result<f64, EvalError> {
    finite(round_half_away(value, digits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn number(formula: &str) -> f64 {
        match evaluate(formula).expect("evaluate") {
            Value::Number(value) => value,
            Value::Text(text) => panic!("expected number, got text {text:?}"),
        }
    }

    fn text(formula: &str) -> String {
        match evaluate(formula).expect("evaluate") {
            Value::Text(text) => text,
            Value::Number(value) => panic!("expected text, got number {value}"),
        }
    }

    #[test]
    fn arithmetic_follows_precedence() {
        assert_eq!(number("120 + 2.5"), 122.5);
        assert_eq!(number("2 + 3 * 4"), 14.0);
        assert_eq!(number("(2 + 3) * 4"), 20.0);
        assert_eq!(number("10 / 4 - 1"), 1.5);
        assert_eq!(number("-(3) * -2"), 6.0);
        assert_eq!(number("8 - 2 - 1"), 5.0);
    }

    #[test]
    fn rounding_and_aggregates() {
        assert_eq!(number("round(2.346, 2)"), 2.35);
        assert_eq!(number("round(-2.5)"), -3.0);
        assert_eq!(number("round(1234, -2)"), 1200.0);
        assert_eq!(number("ceil(1.2)"), 2.0);
        assert_eq!(number("floor(-1.2)"), -2.0);
        assert_eq!(number("abs(-7)"), 7.0);
        assert_eq!(number("min(3, 1, 2)"), 1.0);
        assert_eq!(number("max(3, 1, 2)"), 3.0);
    }

    #[test]
    fn string_functions() {
        assert_eq!(text("concat(\"COP \", 3.5)"), "COP 3.5");
        assert_eq!(text("uppercase('kwh')"), "KWH");
        assert_eq!(text("lowercase(\"Gas\")"), "gas");
        assert_eq!(text("\"Total: \" + 12"), "Total: 12");
    }

    #[test]
    fn numeric_text_is_coerced() {
        assert_eq!(number("\"12\" * 2"), 24.0);
        assert_eq!(number("'2,5' + 1"), 3.5);
    }

    #[test]
    fn failures_are_reported_not_raised() {
        assert_eq!(evaluate("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("1 / (2 - 2)"), Err(EvalError::DivisionByZero));
        assert_eq!(
            evaluate("\"abc\" * 2"),
            Err(EvalError::NotANumber("abc".to_string()))
        );
        assert_eq!(
            evaluate("round(1.5, 0.5)"),
            Err(EvalError::InvalidPrecision(0.5))
        );
        let huge = format!("{} * {}", "9".repeat(200), "9".repeat(200));
        assert_eq!(evaluate(&huge), Err(EvalError::NonFinite));
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let sum = vec!["1"; 10_000].join(" + ");
        assert_eq!(
            evaluate(&sum),
            Err(EvalError::TooManyOperators {
                limit: parser::MAX_OPERATORS
            })
        );
        let accepted = vec!["1"; 500].join(" + ");
        assert_eq!(number(&accepted), 500.0);
    }

    #[test]
    fn rounding_large_values_keeps_them() {
        let big = format!("1{}", "0".repeat(307));
        assert_eq!(number(&format!("round({big}, 2)")), 1.0e307);
    }

    fn token() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9]{1,4}(\\.[0-9]{1,3})?",
            prop::sample::select(vec![
                "+", "-", "*", "/", "(", ")", ",", "'2,5'", "\"kWh\"", "round(", "min(",
                "concat(", "abs(",
            ])
            .prop_map(str::to_string),
            "[a-z_]{1,6}",
        ]
    }

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(input in "\\PC{0,64}") {
            let _ = evaluate(&input);
        }

        #[test]
        fn arbitrary_token_streams_never_panic(tokens in prop::collection::vec(token(), 0..80)) {
            let _ = evaluate(&tokens.join(" "));
        }

        #[test]
        fn operator_chains_of_any_length_return(
            length in 1usize..4_000,
            op in prop::sample::select(vec!["+", "-", "*", "/"]),
        ) {
            let chain = vec!["1"; length].join(&format!(" {op} "));
            let result = evaluate(&chain);
            if length > parser::MAX_OPERATORS + 1 {
                prop_assert!(
                    matches!(result, Err(EvalError::TooManyOperators { .. })),
                    "{length} terms: {result:?}"
                );
            } else {
                prop_assert!(result.is_ok(), "{length} terms: {result:?}");
            }
        }
    }
}
