//! Compiler configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sheetlogic_dag::IterativeSettings;
use sheetlogic_formulas::{DateEpoch, EvalOptions};

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Parse cells and evaluate clusters on the rayon pool.
    pub parallel: bool,
    pub lazy_range_threshold: u64,
    /// Applied to formula cells that carry no iterative flag of their own.
    pub default_iterative: Option<IterativeSettings>,
    /// Distance past each validation bound for boundary test cases.
    pub boundary_step: f64,
    pub numeric_tolerance: f64,
    pub date_epoch: DateEpoch,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        let eval = EvalOptions::default();
        Self {
            parallel: true,
            lazy_range_threshold: eval.lazy_range_threshold,
            default_iterative: None,
            boundary_step: 1.0,
            numeric_tolerance: eval.numeric_tolerance,
            date_epoch: eval.date_epoch,
        }
    }
}

impl CompilerOptions {
    pub fn from_yaml(text: &str) -> CompileResult<Self> {
        let options: Self = serde_yaml::from_str(text)?;
        options.validated()
    }

    pub fn from_json(text: &str) -> CompileResult<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validated()
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&text),
            Some("json") => Self::from_json(&text),
            other => Err(CompileError::Config(format!(
                "unsupported config extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            lazy_range_threshold: self.lazy_range_threshold,
            numeric_tolerance: self.numeric_tolerance,
            date_epoch: self.date_epoch,
        }
    }

    fn validated(self) -> CompileResult<Self> {
        if !(self.boundary_step.is_finite() && self.boundary_step > 0.0) {
            return Err(CompileError::Config(format!(
                "boundaryStep must be positive, got {}",
                self.boundary_step
            )));
        }
        if self.numeric_tolerance < 0.0 {
            return Err(CompileError::Config(
                "numericTolerance must not be negative".to_string(),
            ));
        }
        if let Some(settings) = self.default_iterative {
            if settings.convergence_threshold < 0.0 {
                return Err(CompileError::Config(
                    "convergenceThreshold must not be negative".to_string(),
                ));
            }
        }
        Ok(self)
    }
}
