//! # sheetlogic-core
//!
//! Compiles a classified workbook snapshot into a verified computation graph
//! plus synthesized regression tests.
//!
//! This crate provides:
//! - The snapshot input model handed over by the cell classifier
//! - Compiler options
//! - The compile pipeline and its per-cluster output
//! - Type inference, test synthesis, and the error report
//! - An optional enrichment hook for human-readable metadata

/// Optional rule naming and descriptions.
pub mod enrich;
/// Error types and result aliases.
pub mod error;
/// Cluster evaluation, including iterative cycles.
pub mod evaluate;
pub mod inference;
pub mod options;
pub mod report;
pub mod snapshot;
pub mod synth;

mod compiler;

pub use compiler::{
    CellLogic, CompilationOutput, Compiler, LogicExtractionResult, UnsupportedFeature,
};
pub use enrich::{CellAnnotation, Enrichment, EnrichmentError, NoopEnricher, RuleEnricher};
pub use error::{CompileError, CompileResult};
pub use inference::{InferredType, TypeInference};
pub use options::CompilerOptions;
pub use report::{ErrorReport, ImpactAnalysis, Issue, IssueKind};
pub use snapshot::{CellRole, CellValue, ClassifiedCell, Validation, ValidationKind, WorkbookSnapshot};
pub use synth::{TestCase, TestOrigin};

pub use sheetlogic_dag::{DependencyGraph, IterativeSettings};
pub use sheetlogic_primitives::{Coordinate, ErrorKind, EvaluatedValue};
