//! Evaluated cell values and spreadsheet error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A computed cell value. Arithmetic on text or missing cells degrades to an
/// `Error` value instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluatedValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Day count from the workbook epoch; numerically identical to `Number`.
    DateSerial(f64),
    Error(ErrorKind),
    Empty,
}

impl EvaluatedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Text(_) => ValueType::Text,
            Self::Boolean(_) => ValueType::Boolean,
            Self::DateSerial(_) => ValueType::Date,
            Self::Error(_) => ValueType::Error,
            Self::Empty => ValueType::Empty,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            Self::Error(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The underlying number of a numeric or date value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) | Self::DateSerial(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }
}

impl fmt::Display for EvaluatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) | Self::DateSerial(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Error(kind) => f.write_str(kind.label()),
            Self::Empty => Ok(()),
        }
    }
}

/// The type tag of an evaluated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Number,
    Text,
    Boolean,
    Date,
    Error,
    Empty,
}

/// Typed spreadsheet errors carried as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DivideByZero,
    ValueError,
    NotFound,
    Reference,
    Name,
    Num,
    Null,
    CircularReference,
    DidNotConverge,
    /// A dynamic reference that cannot be resolved statically.
    Unsupported,
    /// The cell's formula failed to parse or resolve.
    InvalidFormula,
}

impl ErrorKind {
    /// Excel-style error label
    pub fn label(&self) -> &'static str {
        match self {
            Self::DivideByZero => "#DIV/0!",
            Self::ValueError => "#VALUE!",
            Self::NotFound => "#N/A",
            Self::Reference => "#REF!",
            Self::Name => "#NAME?",
            Self::Num => "#NUM!",
            Self::Null => "#NULL!",
            Self::CircularReference => "#CIRCULAR!",
            Self::DidNotConverge => "#NOCONVERGE!",
            Self::Unsupported => "#UNSUPPORTED!",
            Self::InvalidFormula => "#INVALID!",
        }
    }

    /// Parse the error literals a formula may spell out.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "#DIV/0!" => Some(Self::DivideByZero),
            "#VALUE!" => Some(Self::ValueError),
            "#N/A" => Some(Self::NotFound),
            "#REF!" => Some(Self::Reference),
            "#NAME?" => Some(Self::Name),
            "#NUM!" => Some(Self::Num),
            "#NULL!" => Some(Self::Null),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Format a number the way a spreadsheet displays it in text context:
/// no trailing zeros, at most 15 significant digits.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return ErrorKind::Num.label().to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{n:.0}");
    }
    let magnitude = n.abs().log10().floor() as i32;
    let decimals = (14 - magnitude).clamp(0, 17) as usize;
    let text = format!("{n:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Format a number for formula text. Uses the display form whenever it
/// reads back to the same value, and the shortest exact form otherwise.
pub fn format_literal(n: f64) -> String {
    let display = format_number(n);
    if !n.is_finite() || display.parse::<f64>() == Ok(n) {
        return display;
    }
    n.to_string()
}
