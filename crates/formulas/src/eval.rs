//! Tree-walking evaluator.
//!
//! Evaluation reads already-computed cells through a [`CellSource`] and never
//! mutates it, so the same tree over the same binding always yields the same
//! value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sheetlogic_primitives::{Coordinate, ErrorKind, EvaluatedValue, Range, RefTarget};

use crate::ast::FormulaAst;
use crate::coerce;
use crate::dates::DateEpoch;
use crate::functions::{FunctionKind, FunctionRegistry};

/// Read access to evaluated cells.
pub trait CellSource {
    /// Value at a coordinate, `Empty` when unbound.
    fn value(&self, coordinate: &Coordinate) -> EvaluatedValue;

    /// Bound cells inside `range`, row-major. Used for ranges too large to walk.
    fn bound_in(&self, range: &Range) -> Vec<(Coordinate, EvaluatedValue)>;
}

impl CellSource for BTreeMap<Coordinate, EvaluatedValue> {
    fn value(&self, coordinate: &Coordinate) -> EvaluatedValue {
        self.get(coordinate).cloned().unwrap_or(EvaluatedValue::Empty)
    }

    fn bound_in(&self, range: &Range) -> Vec<(Coordinate, EvaluatedValue)> {
        self.range(range.start().clone()..=range.end().clone())
            .filter(|(coord, _)| range.contains(coord))
            .map(|(coord, value)| (coord.clone(), value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Ranges larger than this are reduced over bound cells only.
    pub lazy_range_threshold: u64,
    pub numeric_tolerance: f64,
    pub date_epoch: DateEpoch,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            lazy_range_threshold: 4096,
            numeric_tolerance: 1e-9,
            date_epoch: DateEpoch::default(),
        }
    }
}

/// An evaluated function argument. Ranges stay unexpanded until a function
/// asks for their cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(EvaluatedValue),
    /// A single-cell reference. Aggregates treat it like a one-cell range.
    Cell(Coordinate),
    Range(Range),
    Array(Vec<Vec<EvaluatedValue>>),
}

/// What a builtin sees besides its arguments.
pub struct CallContext<'a> {
    pub source: &'a dyn CellSource,
    pub options: &'a EvalOptions,
}

impl CallContext<'_> {
    /// Collapse an operand to one value. Multi-cell ranges and arrays are a
    /// `ValueError` in scalar position.
    pub fn scalar(&self, operand: &Operand) -> EvaluatedValue {
        match operand {
            Operand::Value(value) => value.clone(),
            Operand::Cell(coord) => self.source.value(coord),
            Operand::Range(range) if range.size() == 1 => self.source.value(range.start()),
            Operand::Array(rows) => match rows.as_slice() {
                [row] if row.len() == 1 => row[0].clone(),
                _ => EvaluatedValue::Error(ErrorKind::ValueError),
            },
            Operand::Range(_) => EvaluatedValue::Error(ErrorKind::ValueError),
        }
    }

    pub fn is_lazy(&self, range: &Range) -> bool {
        range.size() > self.options.lazy_range_threshold
    }

    /// Cells of a range in row-major order. Small ranges yield every
    /// coordinate (blanks included); large ones only the bound cells.
    pub fn cells(&self, range: &Range) -> Vec<(Coordinate, EvaluatedValue)> {
        if self.is_lazy(range) {
            self.source.bound_in(range)
        } else {
            range
                .iter()
                .map(|coord| {
                    let value = self.source.value(&coord);
                    (coord, value)
                })
                .collect()
        }
    }

    /// Flattened values of an operand.
    pub fn values(&self, operand: &Operand) -> Vec<EvaluatedValue> {
        match operand {
            Operand::Value(value) => vec![value.clone()],
            Operand::Cell(coord) => vec![self.source.value(coord)],
            Operand::Range(range) => self.cells(range).into_iter().map(|(_, v)| v).collect(),
            Operand::Array(rows) => rows.iter().flatten().cloned().collect(),
        }
    }
}

pub struct Evaluator<'a> {
    functions: &'a FunctionRegistry,
    options: EvalOptions,
}

impl<'a> Evaluator<'a> {
    pub fn new(functions: &'a FunctionRegistry, options: EvalOptions) -> Self {
        Self { functions, options }
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Evaluate a formula to a single value. A range or array result yields
    /// its top-left element.
    pub fn evaluate(&self, ast: &FormulaAst, source: &dyn CellSource) -> EvaluatedValue {
        let ctx = CallContext {
            source,
            options: &self.options,
        };
        match self.eval_node(ast, &ctx) {
            Operand::Value(value) => value,
            Operand::Cell(coord) => source.value(&coord),
            Operand::Range(range) => source.value(range.start()),
            Operand::Array(rows) => rows
                .first()
                .and_then(|row| row.first())
                .cloned()
                .unwrap_or(EvaluatedValue::Error(ErrorKind::ValueError)),
        }
    }

    fn eval_node(&self, node: &FormulaAst, ctx: &CallContext<'_>) -> Operand {
        match node {
            FormulaAst::Literal(value) => Operand::Value(value.clone()),
            FormulaAst::ArrayLiteral(rows) => Operand::Array(rows.clone()),
            FormulaAst::Reference(reference) => match &reference.target {
                RefTarget::Cell(coord) => Operand::Cell(coord.clone()),
                RefTarget::Range(range) => Operand::Range(range.clone()),
            },
            FormulaAst::DynamicReference { .. } => {
                Operand::Value(EvaluatedValue::Error(ErrorKind::Unsupported))
            }
            FormulaAst::UnaryOp { op, operand } => {
                let value = ctx.scalar(&self.eval_node(operand, ctx));
                Operand::Value(coerce::unary(*op, &value))
            }
            FormulaAst::BinaryOp { op, left, right } => {
                let left = ctx.scalar(&self.eval_node(left, ctx));
                let right = ctx.scalar(&self.eval_node(right, ctx));
                Operand::Value(coerce::binary(
                    *op,
                    &left,
                    &right,
                    self.options.numeric_tolerance,
                ))
            }
            FormulaAst::FunctionCall { name, args } => self.call(name, args, ctx),
        }
    }

    fn call(&self, name: &str, args: &[FormulaAst], ctx: &CallContext<'_>) -> Operand {
        let Some(def) = self.functions.get(name) else {
            return Operand::Value(EvaluatedValue::Error(ErrorKind::Name));
        };
        let has_empty = args
            .iter()
            .any(|arg| matches!(arg, FormulaAst::Literal(EvaluatedValue::Empty)));
        if def.check_arity(args.len(), has_empty).is_err() {
            return Operand::Value(EvaluatedValue::Error(ErrorKind::ValueError));
        }

        match def.kind {
            FunctionKind::Conditional => self.conditional(def.name, args, ctx),
            FunctionKind::Dynamic => Operand::Value(EvaluatedValue::Error(ErrorKind::Unsupported)),
            FunctionKind::Eager(eval) => {
                let operands: Vec<Operand> =
                    args.iter().map(|arg| self.eval_node(arg, ctx)).collect();
                if !def.accepts_errors {
                    let first_error = operands.iter().find_map(|operand| match operand {
                        Operand::Value(value) => value.error(),
                        _ => None,
                    });
                    if let Some(kind) = first_error {
                        return Operand::Value(EvaluatedValue::Error(kind));
                    }
                }
                Operand::Value(eval(&operands, ctx).unwrap_or_else(EvaluatedValue::Error))
            }
        }
    }

    // IF and IFERROR only evaluate the branch they select.
    fn conditional(&self, name: &str, args: &[FormulaAst], ctx: &CallContext<'_>) -> Operand {
        match name {
            "IF" => {
                let condition = ctx.scalar(&self.eval_node(&args[0], ctx));
                let chosen = match coerce::to_bool(&condition) {
                    Ok(true) => args.get(1),
                    Ok(false) => args.get(2),
                    Err(kind) => return Operand::Value(EvaluatedValue::Error(kind)),
                };
                match chosen {
                    Some(branch) => self.branch(branch, ctx),
                    None => Operand::Value(EvaluatedValue::Boolean(false)),
                }
            }
            "IFERROR" => {
                let value = ctx.scalar(&self.eval_node(&args[0], ctx));
                if value.is_error() {
                    self.branch(&args[1], ctx)
                } else {
                    Operand::Value(value)
                }
            }
            _ => Operand::Value(EvaluatedValue::Error(ErrorKind::Name)),
        }
    }

    // An omitted branch argument yields 0.
    fn branch(&self, node: &FormulaAst, ctx: &CallContext<'_>) -> Operand {
        match node {
            FormulaAst::Literal(EvaluatedValue::Empty) => Operand::Value(EvaluatedValue::Number(0.0)),
            other => self.eval_node(other, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, Reference};

    fn cell(col: u32, row: u32) -> Coordinate {
        Coordinate::new("Sheet1", col, row)
    }

    fn reference(col: u32, row: u32) -> FormulaAst {
        FormulaAst::Reference(Reference::new(RefTarget::Cell(cell(col, row))))
    }

    #[test]
    fn test_source_bound_in_is_row_major() {
        let mut source = BTreeMap::new();
        source.insert(cell(2, 2), EvaluatedValue::Number(4.0));
        source.insert(cell(1, 2), EvaluatedValue::Number(3.0));
        source.insert(cell(2, 1), EvaluatedValue::Number(2.0));
        source.insert(cell(9, 9), EvaluatedValue::Number(9.0));
        let range = Range::new(cell(1, 1), cell(2, 2)).unwrap();
        let coords: Vec<_> = source.bound_in(&range).into_iter().map(|(c, _)| c).collect();
        assert_eq!(coords, vec![cell(2, 1), cell(1, 2), cell(2, 2)]);
    }

    #[test]
    fn test_btreemap_source_filters_columns() {
        let mut source = BTreeMap::new();
        source.insert(cell(1, 1), EvaluatedValue::Number(1.0));
        source.insert(cell(5, 1), EvaluatedValue::Number(5.0));
        source.insert(cell(1, 2), EvaluatedValue::Number(2.0));
        let range = Range::new(cell(1, 1), cell(1, 2)).unwrap();
        assert_eq!(source.bound_in(&range).len(), 2);
    }

    #[test]
    fn test_reference_to_unbound_cell_is_empty() {
        let registry = FunctionRegistry::new();
        let evaluator = Evaluator::new(&registry, EvalOptions::default());
        let source: BTreeMap<Coordinate, EvaluatedValue> = BTreeMap::new();
        assert_eq!(evaluator.evaluate(&reference(1, 1), &source), EvaluatedValue::Empty);
    }

    #[test]
    fn test_multi_cell_range_in_operator_is_value_error() {
        let registry = FunctionRegistry::new();
        let evaluator = Evaluator::new(&registry, EvalOptions::default());
        let source: BTreeMap<Coordinate, EvaluatedValue> = BTreeMap::new();
        let ast = FormulaAst::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(FormulaAst::Reference(Reference::new(RefTarget::Range(
                Range::new(cell(1, 1), cell(1, 2)).unwrap(),
            )))),
            right: Box::new(FormulaAst::Literal(EvaluatedValue::Number(1.0))),
        };
        assert_eq!(
            evaluator.evaluate(&ast, &source),
            EvaluatedValue::Error(ErrorKind::ValueError)
        );
    }

    #[test]
    fn test_top_level_array_takes_top_left() {
        let registry = FunctionRegistry::new();
        let evaluator = Evaluator::new(&registry, EvalOptions::default());
        let source: BTreeMap<Coordinate, EvaluatedValue> = BTreeMap::new();
        let ast = FormulaAst::ArrayLiteral(vec![vec![
            EvaluatedValue::Number(7.0),
            EvaluatedValue::Number(8.0),
        ]]);
        assert_eq!(evaluator.evaluate(&ast, &source), EvaluatedValue::Number(7.0));
        let empty = FormulaAst::ArrayLiteral(vec![]);
        assert_eq!(
            evaluator.evaluate(&empty, &source),
            EvaluatedValue::Error(ErrorKind::ValueError)
        );
    }

    #[test]
    fn test_unknown_function_is_name_error() {
        let registry = FunctionRegistry::new();
        let evaluator = Evaluator::new(&registry, EvalOptions::default());
        let source: BTreeMap<Coordinate, EvaluatedValue> = BTreeMap::new();
        let ast = FormulaAst::FunctionCall {
            name: "FROBNICATE".to_string(),
            args: vec![],
        };
        assert_eq!(
            evaluator.evaluate(&ast, &source),
            EvaluatedValue::Error(ErrorKind::Name)
        );
    }
}
