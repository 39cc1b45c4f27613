//! Operator coercion table.
//!
//! Each operator is one function over two (or one) evaluated values. Errors
//! in operands always win, left operand first.

use std::cmp::Ordering;

use sheetlogic_primitives::{format_number, ErrorKind, EvaluatedValue};

use crate::ast::{BinaryOperator, UnaryOperator};

/// Numeric coercion: booleans are 0/1, blanks are 0, numeric text parses,
/// any other text is `ValueError`.
pub fn to_number(value: &EvaluatedValue) -> Result<f64, ErrorKind> {
    match value {
        EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => Ok(*n),
        EvaluatedValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        EvaluatedValue::Empty => Ok(0.0),
        EvaluatedValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or(ErrorKind::ValueError),
        EvaluatedValue::Error(kind) => Err(*kind),
    }
}

/// Text coercion used by `&` and the text functions.
pub fn to_text(value: &EvaluatedValue) -> Result<String, ErrorKind> {
    match value {
        EvaluatedValue::Error(kind) => Err(*kind),
        other => Ok(other.to_string()),
    }
}

/// Logical coercion: numbers are true when non-zero, blanks are false,
/// `"TRUE"`/`"FALSE"` text is accepted.
pub fn to_bool(value: &EvaluatedValue) -> Result<bool, ErrorKind> {
    match value {
        EvaluatedValue::Boolean(b) => Ok(*b),
        EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => Ok(*n != 0.0),
        EvaluatedValue::Empty => Ok(false),
        EvaluatedValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        EvaluatedValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        EvaluatedValue::Text(_) => Err(ErrorKind::ValueError),
        EvaluatedValue::Error(kind) => Err(*kind),
    }
}

/// Apply a binary operator.
pub fn binary(
    op: BinaryOperator,
    left: &EvaluatedValue,
    right: &EvaluatedValue,
    tolerance: f64,
) -> EvaluatedValue {
    if let Some(kind) = left.error().or_else(|| right.error()) {
        return EvaluatedValue::Error(kind);
    }
    match op {
        BinaryOperator::Add => add(left, right),
        BinaryOperator::Subtract => subtract(left, right),
        BinaryOperator::Multiply => multiply(left, right),
        BinaryOperator::Divide => divide(left, right),
        BinaryOperator::Power => power(left, right),
        BinaryOperator::Concat => concat(left, right),
        BinaryOperator::Equal => EvaluatedValue::Boolean(equal(left, right, tolerance)),
        BinaryOperator::NotEqual => EvaluatedValue::Boolean(!equal(left, right, tolerance)),
        BinaryOperator::LessThan => order(left, right, tolerance, Ordering::is_lt),
        BinaryOperator::LessThanOrEqual => order(left, right, tolerance, Ordering::is_le),
        BinaryOperator::GreaterThan => order(left, right, tolerance, Ordering::is_gt),
        BinaryOperator::GreaterThanOrEqual => order(left, right, tolerance, Ordering::is_ge),
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOperator, operand: &EvaluatedValue) -> EvaluatedValue {
    match op {
        UnaryOperator::Plus => operand.clone(),
        UnaryOperator::Negate => numeric(to_number(operand).map(|n| -n)),
        UnaryOperator::Percent => numeric(to_number(operand).map(|n| n / 100.0)),
    }
}

/// Date + number stays a date.
pub fn add(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    let result = arithmetic(left, right, |l, r| l + r);
    let dated = matches!(left, EvaluatedValue::DateSerial(_)) != matches!(right, EvaluatedValue::DateSerial(_));
    retag(result, dated)
}

/// Date - number stays a date; date - date is a plain day count.
pub fn subtract(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    let result = arithmetic(left, right, |l, r| l - r);
    let dated = matches!(left, EvaluatedValue::DateSerial(_)) && !matches!(right, EvaluatedValue::DateSerial(_));
    retag(result, dated)
}

pub fn multiply(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    arithmetic(left, right, |l, r| l * r)
}

pub fn divide(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    match (to_number(left), to_number(right)) {
        (Err(kind), _) | (_, Err(kind)) => EvaluatedValue::Error(kind),
        (Ok(_), Ok(r)) if r == 0.0 => EvaluatedValue::Error(ErrorKind::DivideByZero),
        (Ok(l), Ok(r)) => numeric(Ok(l / r)),
    }
}

pub fn power(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    match (to_number(left), to_number(right)) {
        (Err(kind), _) | (_, Err(kind)) => EvaluatedValue::Error(kind),
        (Ok(l), Ok(r)) if l == 0.0 && r < 0.0 => EvaluatedValue::Error(ErrorKind::DivideByZero),
        (Ok(l), Ok(r)) => numeric(Ok(l.powf(r))),
    }
}

/// `&` joins the text forms of both sides.
pub fn concat(left: &EvaluatedValue, right: &EvaluatedValue) -> EvaluatedValue {
    match (to_text(left), to_text(right)) {
        (Ok(l), Ok(r)) => EvaluatedValue::Text(l + &r),
        (Err(kind), _) | (_, Err(kind)) => EvaluatedValue::Error(kind),
    }
}

/// Structural equality. Text compares case-insensitively; blanks equal
/// zero, empty text, and FALSE; numbers and dates share one value space.
pub fn equal(left: &EvaluatedValue, right: &EvaluatedValue, tolerance: f64) -> bool {
    use EvaluatedValue as V;
    match (left, right) {
        (V::Empty, V::Empty) => true,
        (V::Empty, other) | (other, V::Empty) => match other {
            V::Number(n) | V::DateSerial(n) => *n == 0.0,
            V::Text(s) => s.is_empty(),
            V::Boolean(b) => !*b,
            _ => false,
        },
        (V::Number(a) | V::DateSerial(a), V::Number(b) | V::DateSerial(b)) => {
            (a - b).abs() <= tolerance
        }
        (V::Text(a), V::Text(b)) => a.to_lowercase() == b.to_lowercase(),
        (V::Boolean(a), V::Boolean(b)) => a == b,
        (V::Error(a), V::Error(b)) => a == b,
        _ => false,
    }
}

/// Ordering between comparable values; `None` when the types are incompatible.
pub fn compare(left: &EvaluatedValue, right: &EvaluatedValue, tolerance: f64) -> Option<Ordering> {
    use EvaluatedValue as V;
    match (left, right) {
        (V::Empty, V::Empty) => Some(Ordering::Equal),
        (V::Empty, V::Number(_) | V::DateSerial(_)) => compare(&V::Number(0.0), right, tolerance),
        (V::Number(_) | V::DateSerial(_), V::Empty) => compare(left, &V::Number(0.0), tolerance),
        (V::Empty, V::Text(_)) => compare(&V::Text(String::new()), right, tolerance),
        (V::Text(_), V::Empty) => compare(left, &V::Text(String::new()), tolerance),
        (V::Empty, V::Boolean(_)) => compare(&V::Boolean(false), right, tolerance),
        (V::Boolean(_), V::Empty) => compare(left, &V::Boolean(false), tolerance),
        (V::Number(a) | V::DateSerial(a), V::Number(b) | V::DateSerial(b)) => {
            if (a - b).abs() <= tolerance {
                Some(Ordering::Equal)
            } else {
                a.partial_cmp(b)
            }
        }
        (V::Text(a), V::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        (V::Boolean(a), V::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn order(
    left: &EvaluatedValue,
    right: &EvaluatedValue,
    tolerance: f64,
    accept: fn(Ordering) -> bool,
) -> EvaluatedValue {
    EvaluatedValue::Boolean(compare(left, right, tolerance).is_some_and(accept))
}

fn arithmetic(left: &EvaluatedValue, right: &EvaluatedValue, op: fn(f64, f64) -> f64) -> EvaluatedValue {
    match (to_number(left), to_number(right)) {
        (Ok(l), Ok(r)) => numeric(Ok(op(l, r))),
        (Err(kind), _) | (_, Err(kind)) => EvaluatedValue::Error(kind),
    }
}

fn numeric(result: Result<f64, ErrorKind>) -> EvaluatedValue {
    match result {
        Ok(n) if n.is_finite() => EvaluatedValue::Number(n),
        Ok(_) => EvaluatedValue::Error(ErrorKind::Num),
        Err(kind) => EvaluatedValue::Error(kind),
    }
}

fn retag(value: EvaluatedValue, dated: bool) -> EvaluatedValue {
    match value {
        EvaluatedValue::Number(n) if dated => EvaluatedValue::DateSerial(n),
        other => other,
    }
}

/// Text form of a number for `&`, exposed for the function library.
pub fn number_text(n: f64) -> String {
    format_number(n)
}
