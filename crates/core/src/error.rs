//! Error types for workbook compilation.
//!
//! Only snapshot-level failures surface here. Per-cell problems (bad syntax,
//! unknown references, cycles) are recovered and land in the
//! [`ErrorReport`](crate::report::ErrorReport) instead.

use sheetlogic_dag::DagError;
use sheetlogic_primitives::Coordinate;
use thiserror::Error;

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Two classified cells share a coordinate.
    #[error("Duplicate cell in snapshot: {0}")]
    DuplicateCell(Coordinate),

    /// A named range whose target text is not a reference.
    #[error("Invalid named range '{name}': {message}")]
    NamedRange { name: String, message: String },

    /// Structurally invalid snapshot content.
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Graph error: {0}")]
    Graph(#[from] DagError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Unreadable or contradictory compiler options.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CompileError {
    pub fn named_range(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NamedRange {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }
}
