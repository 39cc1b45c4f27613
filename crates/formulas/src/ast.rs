//! Formula syntax tree and its canonical text form.

use serde::{Deserialize, Serialize};
use sheetlogic_primitives::{format_literal, Coordinate, EvaluatedValue, RefTarget};
use std::fmt;

/// A parsed formula. Each node owns its children; there is no sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormulaAst {
    FunctionCall {
        name: String,
        args: Vec<FormulaAst>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaAst>,
        right: Box<FormulaAst>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaAst>,
    },
    Reference(Reference),
    /// Literal value. `Empty` stands for an omitted function argument.
    Literal(EvaluatedValue),
    ArrayLiteral(Vec<Vec<EvaluatedValue>>),
    /// A reference computed at evaluation time (`INDIRECT`, non-literal `OFFSET`).
    DynamicReference {
        function: String,
        args: Vec<FormulaAst>,
    },
}

/// A reference resolved at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub target: RefTarget,
    /// The named range this reference was written as, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl Reference {
    pub fn new(target: RefTarget) -> Self {
        Self { target, name: None }
    }

    pub fn named(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            target,
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Concat,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => "^",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::Concat => "&",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Percent,
}

impl FormulaAst {
    /// Visit every resolved reference in evaluation order.
    pub fn for_each_reference<'a>(&'a self, f: &mut dyn FnMut(&'a Reference)) {
        match self {
            Self::Reference(reference) => f(reference),
            Self::FunctionCall { args, .. } | Self::DynamicReference { args, .. } => {
                for arg in args {
                    arg.for_each_reference(f);
                }
            }
            Self::BinaryOp { left, right, .. } => {
                left.for_each_reference(f);
                right.for_each_reference(f);
            }
            Self::UnaryOp { operand, .. } => operand.for_each_reference(f),
            Self::Literal(_) | Self::ArrayLiteral(_) => {}
        }
    }

    /// All references in the tree.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.for_each_reference(&mut |r| out.push(r));
        out
    }

    pub fn contains_dynamic_reference(&self) -> bool {
        match self {
            Self::DynamicReference { .. } => true,
            Self::FunctionCall { args, .. } => args.iter().any(Self::contains_dynamic_reference),
            Self::BinaryOp { left, right, .. } => {
                left.contains_dynamic_reference() || right.contains_dynamic_reference()
            }
            Self::UnaryOp { operand, .. } => operand.contains_dynamic_reference(),
            Self::Reference(_) | Self::Literal(_) | Self::ArrayLiteral(_) => false,
        }
    }

    /// Canonical formula text, including the leading `=`.
    ///
    /// References are always sheet-qualified unless they sit on `sheet`.
    pub fn to_formula(&self, sheet: &str) -> String {
        let mut out = String::from("=");
        write_node(&mut out, self, Some(sheet));
        out
    }
}

impl fmt::Display for FormulaAst {
    /// Canonical text without the leading `=`, every reference sheet-qualified.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_node(&mut out, self, None);
        f.write_str(&out)
    }
}

fn write_node(out: &mut String, node: &FormulaAst, sheet: Option<&str>) {
    match node {
        FormulaAst::Literal(value) => write_literal(out, value),
        FormulaAst::ArrayLiteral(rows) => {
            out.push('{');
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    out.push(';');
                }
                for (c, value) in row.iter().enumerate() {
                    if c > 0 {
                        out.push(',');
                    }
                    write_literal(out, value);
                }
            }
            out.push('}');
        }
        FormulaAst::Reference(reference) => write_reference(out, reference, sheet),
        FormulaAst::FunctionCall { name, args } | FormulaAst::DynamicReference { function: name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(out, arg, sheet);
            }
            out.push(')');
        }
        FormulaAst::UnaryOp { op, operand } => match op {
            UnaryOperator::Percent => {
                write_operand(out, operand, sheet);
                out.push('%');
            }
            UnaryOperator::Negate | UnaryOperator::Plus => {
                out.push(if *op == UnaryOperator::Negate { '-' } else { '+' });
                write_operand(out, operand, sheet);
            }
        },
        FormulaAst::BinaryOp { op, left, right } => {
            write_operand(out, left, sheet);
            out.push_str(op.symbol());
            write_operand(out, right, sheet);
        }
    }
}

// Operators always parenthesize operator children so the printed text
// re-parses to the same tree regardless of precedence.
fn write_operand(out: &mut String, node: &FormulaAst, sheet: Option<&str>) {
    let wrap = match node {
        FormulaAst::BinaryOp { .. } => true,
        FormulaAst::UnaryOp { op, .. } => *op != UnaryOperator::Percent,
        FormulaAst::Literal(EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n)) => {
            n.is_sign_negative()
        }
        _ => false,
    };
    if wrap {
        out.push('(');
        write_node(out, node, sheet);
        out.push(')');
    } else {
        write_node(out, node, sheet);
    }
}

fn write_literal(out: &mut String, value: &EvaluatedValue) {
    match value {
        EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => out.push_str(&format_literal(*n)),
        EvaluatedValue::Text(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        EvaluatedValue::Boolean(true) => out.push_str("TRUE"),
        EvaluatedValue::Boolean(false) => out.push_str("FALSE"),
        EvaluatedValue::Error(kind) => out.push_str(kind.label()),
        EvaluatedValue::Empty => {}
    }
}

fn write_reference(out: &mut String, reference: &Reference, sheet: Option<&str>) {
    if let Some(name) = &reference.name {
        out.push_str(name);
        return;
    }
    let text = reference.target.to_string();
    match sheet {
        Some(current) if reference.target.sheet() == current => {
            // drop the qualifier for same-sheet references
            let unqualified = text.rsplit_once('!').map(|(_, a)| a).unwrap_or(&text);
            out.push_str(unqualified);
        }
        _ => out.push_str(&text),
    }
}

/// Convenience for the coordinate a single-cell reference points at.
pub fn reference_cell(reference: &Reference) -> Option<&Coordinate> {
    match &reference.target {
        RefTarget::Cell(coord) => Some(coord),
        RefTarget::Range(_) => None,
    }
}
