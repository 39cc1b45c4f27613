//! The classified workbook handed over by the upstream cell classifier.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sheetlogic_dag::{IterativeSettings, NodeRole};
use sheetlogic_formulas::ReferenceResolver;
use sheetlogic_primitives::{Coordinate, ErrorKind, EvaluatedValue, NamedRange};

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellRole {
    Input,
    Formula,
    Output,
    Label,
}

impl CellRole {
    /// Graph role, or `None` for cells that stay out of the graph.
    pub fn node_role(self, has_formula: bool) -> Option<NodeRole> {
        match self {
            Self::Label => None,
            Self::Output => Some(NodeRole::Output),
            Self::Formula => Some(NodeRole::Formula),
            Self::Input if has_formula => Some(NodeRole::Formula),
            Self::Input => Some(NodeRole::Input),
        }
    }
}

/// A raw cell value as it appears in snapshot JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl CellValue {
    /// Text that spells an error literal becomes an error value.
    pub fn to_evaluated(&self, as_date: bool) -> EvaluatedValue {
        match self {
            Self::Number(n) if as_date => EvaluatedValue::DateSerial(*n),
            Self::Number(n) => EvaluatedValue::Number(*n),
            Self::Boolean(b) => EvaluatedValue::Boolean(*b),
            Self::Text(s) => match ErrorKind::from_label(s) {
                Some(kind) => EvaluatedValue::Error(kind),
                None => EvaluatedValue::Text(s.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationKind {
    Whole,
    Decimal,
    Number,
    Date,
    List,
    Text,
    Custom,
}

impl ValidationKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Whole | Self::Decimal | Self::Number | Self::Date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub kind: ValidationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CellValue>,
}

/// One cell as classified upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedCell {
    pub coordinate: Coordinate,
    pub role: CellRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    /// Iterative calculation permitted for this cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterative: Option<IterativeSettings>,
}

impl ClassifiedCell {
    pub fn input(coordinate: Coordinate, value: CellValue) -> Self {
        Self {
            coordinate,
            role: CellRole::Input,
            raw_formula: None,
            current_value: Some(value),
            validation: None,
            iterative: None,
        }
    }

    pub fn formula(coordinate: Coordinate, role: CellRole, formula: impl Into<String>) -> Self {
        Self {
            coordinate,
            role,
            raw_formula: Some(formula.into()),
            current_value: None,
            validation: None,
            iterative: None,
        }
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_iterative(mut self, settings: IterativeSettings) -> Self {
        self.iterative = Some(settings);
        self
    }

    pub fn has_formula(&self) -> bool {
        self.raw_formula.as_deref().is_some_and(|f| !f.trim().is_empty())
    }

    pub fn is_date(&self) -> bool {
        self.validation
            .as_ref()
            .is_some_and(|v| v.kind == ValidationKind::Date)
    }

    /// The stored value, `Empty` when absent.
    pub fn evaluated_value(&self) -> EvaluatedValue {
        self.current_value
            .as_ref()
            .map_or(EvaluatedValue::Empty, |v| v.to_evaluated(self.is_date()))
    }

    /// Inputs are perturbed numerically when they hold a number or declare a
    /// numeric validation.
    pub fn is_numeric_input(&self) -> bool {
        matches!(self.current_value, Some(CellValue::Number(_)))
            || self.validation.as_ref().is_some_and(|v| v.kind.is_numeric())
    }
}

/// A named range entry, e.g. `{"name": "TaxRate", "target": "Config!B1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRangeEntry {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookSnapshot {
    /// Declared sheet names. Derived from the cells when empty.
    #[serde(default)]
    pub sheets: Vec<String>,
    pub cells: Vec<ClassifiedCell>,
    #[serde(default)]
    pub named_ranges: Vec<NamedRangeEntry>,
    /// Workbook-wide iterative calculation flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterative: Option<IterativeSettings>,
}

impl WorkbookSnapshot {
    pub fn new(cells: Vec<ClassifiedCell>) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn with_named_range(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.named_ranges.push(NamedRangeEntry {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    pub fn from_json(text: &str) -> CompileResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> CompileResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Declared sheets, or every sheet a cell lives on, in first-seen order
    /// with case-insensitive duplicates dropped.
    pub fn sheet_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut first = |name: &&String| seen.insert(name.to_ascii_uppercase());
        if self.sheets.is_empty() {
            self.cells
                .iter()
                .map(|c| &c.coordinate.sheet)
                .filter(&mut first)
                .cloned()
                .collect()
        } else {
            self.sheets.iter().filter(&mut first).cloned().collect()
        }
    }

    /// Rewrite cell sheets to the spelling `resolver` knows them by, so
    /// `sheet1!A1` and `Sheet1!A1` name the same coordinate.
    pub fn with_canonical_sheets(&self, resolver: &ReferenceResolver) -> Cow<'_, Self> {
        let differs = |cell: &ClassifiedCell| {
            resolver
                .canonical_sheet(&cell.coordinate.sheet)
                .is_some_and(|canonical| canonical != cell.coordinate.sheet)
        };
        if !self.cells.iter().any(differs) {
            return Cow::Borrowed(self);
        }
        let mut canonical = self.clone();
        for cell in &mut canonical.cells {
            if let Some(sheet) = resolver.canonical_sheet(&cell.coordinate.sheet) {
                if sheet != cell.coordinate.sheet {
                    cell.coordinate.sheet = sheet.to_string();
                }
            }
        }
        Cow::Owned(canonical)
    }

    /// Reject duplicate coordinates and cells on undeclared sheets before
    /// anything else looks at the cells.
    pub fn validate(&self) -> CompileResult<()> {
        let mut seen = HashSet::with_capacity(self.cells.len());
        for cell in &self.cells {
            if !seen.insert(&cell.coordinate) {
                return Err(CompileError::DuplicateCell(cell.coordinate.clone()));
            }
            if !self.sheets.is_empty()
                && !self
                    .sheets
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&cell.coordinate.sheet))
            {
                return Err(CompileError::snapshot(format!(
                    "cell {} is on undeclared sheet '{}'",
                    cell.coordinate, cell.coordinate.sheet
                )));
            }
        }
        Ok(())
    }

    /// Build the reference resolver. Named-range targets must be
    /// sheet-qualified and must not refer to other names.
    pub fn resolver(&self) -> CompileResult<ReferenceResolver> {
        let sheets = self.sheet_names();
        let bare = ReferenceResolver::new(std::iter::empty(), sheets.iter().cloned());
        let mut named = Vec::with_capacity(self.named_ranges.len());
        for entry in &self.named_ranges {
            if !entry.target.contains('!') {
                return Err(CompileError::named_range(
                    &entry.name,
                    "target must be sheet-qualified",
                ));
            }
            let resolved = bare
                .resolve(&entry.target, "")
                .map_err(|e| CompileError::named_range(&entry.name, e.to_string()))?;
            named.push(NamedRange::new(&entry.name, resolved.target));
        }
        Ok(ReferenceResolver::new(named, sheets))
    }
}
