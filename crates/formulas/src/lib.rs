//! # Sheetlogic Formulas
//!
//! Formula parsing, reference resolution, and evaluation.
//! Includes the builtin function registry (SUM, VLOOKUP, etc.)

use serde::{Deserialize, Serialize};
use sheetlogic_primitives::{EvaluatedValue, RefTarget};

pub mod ast;
pub mod coerce;
pub mod criteria;
pub mod dates;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod refs;

pub use ast::{BinaryOperator, FormulaAst, Reference, UnaryOperator};
pub use dates::DateEpoch;
pub use eval::{CellSource, EvalOptions, Evaluator};
pub use functions::{FunctionDefinition, FunctionKind, FunctionRegistry};
pub use parser::{parse_formula, ParseContext, ParsedFormula, UnsupportedConstruct, UnsupportedReason};
pub use refs::{ReferenceResolver, ResolveError, ResolvedReference};

/// A parsed formula with its resolved references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFormula {
    /// The original formula text
    pub source: String,
    pub ast: FormulaAst,
    /// Every reference target in evaluation order, duplicates included.
    pub dependencies: Vec<RefTarget>,
    pub unsupported: Vec<UnsupportedConstruct>,
}

/// Formula errors. Positions are character offsets into the formula text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum FormulaError {
    #[error("Parse error at {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("Unknown reference '{reference}' at {position}")]
    UnknownReference { position: usize, reference: String },
    #[error("Invalid argument count for {function}: expected {expected}, got {got}")]
    Arity {
        position: usize,
        function: String,
        expected: String,
        got: usize,
    },
}

impl FormulaError {
    pub fn position(&self) -> usize {
        match self {
            Self::Parse { position, .. }
            | Self::UnknownReference { position, .. }
            | Self::Arity { position, .. } => *position,
        }
    }
}

/// Parses formulas against one workbook's names and evaluates them.
///
/// The engine is immutable after construction and can be shared across
/// threads.
#[derive(Debug, Default)]
pub struct FormulaEngine {
    resolver: ReferenceResolver,
    functions: FunctionRegistry,
    options: EvalOptions,
}

impl FormulaEngine {
    pub fn new(resolver: ReferenceResolver, options: EvalOptions) -> Self {
        Self {
            resolver,
            functions: FunctionRegistry::default(),
            options,
        }
    }

    /// Replace the builtin registry, e.g. to add workbook-specific functions.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Parse a formula that lives on `sheet`.
    pub fn compile(&self, formula: &str, sheet: &str) -> Result<CompiledFormula, FormulaError> {
        let ctx = ParseContext {
            sheet,
            resolver: &self.resolver,
            functions: &self.functions,
        };
        let parsed = parse_formula(formula, &ctx)?;
        let dependencies = parsed
            .ast
            .references()
            .into_iter()
            .map(|r| r.target.clone())
            .collect();
        Ok(CompiledFormula {
            source: formula.to_string(),
            ast: parsed.ast,
            dependencies,
            unsupported: parsed.unsupported,
        })
    }

    pub fn evaluate(&self, ast: &FormulaAst, source: &dyn CellSource) -> EvaluatedValue {
        Evaluator::new(&self.functions, self.options).evaluate(ast, source)
    }
}
