//! `SUMIF`-family criteria: `">=10"`, `"<>x"`, `"a*"`, plain values.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use sheetlogic_primitives::EvaluatedValue;

use crate::coerce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CriterionOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum CriterionOperand {
    Number(f64),
    Boolean(bool),
    Text { pattern: String, wildcard: bool },
    Blank,
}

/// A parsed criterion, matched against individual cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    op: CriterionOp,
    operand: CriterionOperand,
}

fn criterion_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(<=|>=|<>|<|>|=)?(.*)$").expect("valid regex"))
}

impl Criterion {
    pub fn parse(value: &EvaluatedValue) -> Self {
        match value {
            EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => Self {
                op: CriterionOp::Eq,
                operand: CriterionOperand::Number(*n),
            },
            EvaluatedValue::Boolean(b) => Self {
                op: CriterionOp::Eq,
                operand: CriterionOperand::Boolean(*b),
            },
            EvaluatedValue::Empty | EvaluatedValue::Error(_) => Self {
                op: CriterionOp::Eq,
                operand: CriterionOperand::Blank,
            },
            EvaluatedValue::Text(text) => Self::parse_text(text),
        }
    }

    fn parse_text(text: &str) -> Self {
        let (op, rest) = match criterion_regex().captures(text) {
            Some(caps) => {
                let op = match caps.get(1).map(|m| m.as_str()) {
                    Some("<=") => CriterionOp::Le,
                    Some(">=") => CriterionOp::Ge,
                    Some("<>") => CriterionOp::Ne,
                    Some("<") => CriterionOp::Lt,
                    Some(">") => CriterionOp::Gt,
                    _ => CriterionOp::Eq,
                };
                (op, caps.get(2).map_or("", |m| m.as_str()))
            }
            None => (CriterionOp::Eq, text),
        };
        let operand = if rest.is_empty() {
            CriterionOperand::Blank
        } else if let Ok(n) = rest.trim().parse::<f64>() {
            CriterionOperand::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            CriterionOperand::Boolean(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            CriterionOperand::Boolean(false)
        } else {
            CriterionOperand::Text {
                pattern: rest.to_lowercase(),
                wildcard: rest.contains(['*', '?', '~']),
            }
        };
        Self { op, operand }
    }

    pub fn matches(&self, value: &EvaluatedValue, tolerance: f64) -> bool {
        match self.op {
            CriterionOp::Eq => self.equals(value, tolerance),
            CriterionOp::Ne => !self.equals(value, tolerance),
            CriterionOp::Lt => self.ordered(value, tolerance, Ordering::is_lt),
            CriterionOp::Le => self.ordered(value, tolerance, Ordering::is_le),
            CriterionOp::Gt => self.ordered(value, tolerance, Ordering::is_gt),
            CriterionOp::Ge => self.ordered(value, tolerance, Ordering::is_ge),
        }
    }

    fn equals(&self, value: &EvaluatedValue, tolerance: f64) -> bool {
        match (&self.operand, value) {
            (CriterionOperand::Blank, EvaluatedValue::Empty) => true,
            (CriterionOperand::Blank, EvaluatedValue::Text(s)) => s.is_empty(),
            (CriterionOperand::Blank, _) => false,
            (CriterionOperand::Number(n), EvaluatedValue::Number(v) | EvaluatedValue::DateSerial(v)) => {
                (n - v).abs() <= tolerance
            }
            (CriterionOperand::Number(n), EvaluatedValue::Text(s)) => {
                s.trim().parse::<f64>().is_ok_and(|v| (n - v).abs() <= tolerance)
            }
            (CriterionOperand::Boolean(b), EvaluatedValue::Boolean(v)) => b == v,
            (CriterionOperand::Text { pattern, wildcard }, EvaluatedValue::Text(s)) => {
                if *wildcard {
                    wildcard_match(pattern, &s.to_lowercase())
                } else {
                    *pattern == s.to_lowercase()
                }
            }
            _ => false,
        }
    }

    fn ordered(&self, value: &EvaluatedValue, tolerance: f64, accept: fn(Ordering) -> bool) -> bool {
        let operand = match &self.operand {
            CriterionOperand::Number(n) => EvaluatedValue::Number(*n),
            CriterionOperand::Boolean(b) => EvaluatedValue::Boolean(*b),
            CriterionOperand::Text { pattern, .. } => EvaluatedValue::Text(pattern.clone()),
            CriterionOperand::Blank => return false,
        };
        // blanks never satisfy an ordering criterion
        if matches!(value, EvaluatedValue::Empty) {
            return false;
        }
        coerce::compare(value, &operand, tolerance).is_some_and(accept)
    }
}

#[derive(Clone, Copy)]
enum WildcardToken {
    AnySeq,
    AnyChar,
    Literal(char),
}

fn tokenize_wildcard(pattern: &str) -> Vec<WildcardToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '~' => tokens.push(WildcardToken::Literal(chars.next().unwrap_or('~'))),
            '*' => tokens.push(WildcardToken::AnySeq),
            '?' => tokens.push(WildcardToken::AnyChar),
            _ => tokens.push(WildcardToken::Literal(ch)),
        }
    }
    tokens
}

/// `*` matches any run, `?` any single char, `~` escapes the next char.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;

    for token in tokenize_wildcard(pattern) {
        let mut next = vec![false; text.len() + 1];
        match token {
            WildcardToken::AnySeq => {
                let mut seen = false;
                for i in 0..=text.len() {
                    seen |= reachable[i];
                    next[i] = seen;
                }
            }
            WildcardToken::AnyChar => {
                for i in 0..text.len() {
                    if reachable[i] {
                        next[i + 1] = true;
                    }
                }
            }
            WildcardToken::Literal(ch) => {
                for i in 0..text.len() {
                    if reachable[i] && text[i] == ch {
                        next[i + 1] = true;
                    }
                }
            }
        }
        reachable = next;
    }

    reachable[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> EvaluatedValue {
        EvaluatedValue::Text(s.to_string())
    }

    #[test]
    fn test_numeric_operators() {
        let ge = Criterion::parse(&text(">=10"));
        assert!(ge.matches(&EvaluatedValue::Number(10.0), 0.0));
        assert!(!ge.matches(&EvaluatedValue::Number(9.5), 0.0));
        assert!(!ge.matches(&text("abc"), 0.0));
        assert!(!ge.matches(&EvaluatedValue::Empty, 0.0));

        let ne = Criterion::parse(&text("<>3"));
        assert!(ne.matches(&EvaluatedValue::Number(4.0), 0.0));
        assert!(ne.matches(&EvaluatedValue::Empty, 0.0));
        assert!(!ne.matches(&EvaluatedValue::Number(3.0), 0.0));
    }

    #[test]
    fn test_plain_values() {
        let five = Criterion::parse(&EvaluatedValue::Number(5.0));
        assert!(five.matches(&EvaluatedValue::Number(5.0), 0.0));
        assert!(five.matches(&text("5"), 0.0));
        let apples = Criterion::parse(&text("Apples"));
        assert!(apples.matches(&text("apples"), 0.0));
        assert!(!apples.matches(&text("apple"), 0.0));
    }

    #[test]
    fn test_wildcards() {
        let c = Criterion::parse(&text("ap*"));
        assert!(c.matches(&text("Apple"), 0.0));
        assert!(!c.matches(&text("grape"), 0.0));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(wildcard_match("100~*", "100*"));
        assert!(!wildcard_match("100~*", "1000"));
    }

    #[test]
    fn test_blank_criteria() {
        let blank = Criterion::parse(&text(""));
        assert!(blank.matches(&EvaluatedValue::Empty, 0.0));
        let non_blank = Criterion::parse(&text("<>"));
        assert!(non_blank.matches(&text("x"), 0.0));
        assert!(!non_blank.matches(&EvaluatedValue::Empty, 0.0));
    }
}
