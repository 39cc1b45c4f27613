//! Reference resolution: raw address text to canonical coordinates.
//!
//! The resolver owns the workbook's named-range table and the set of known
//! sheets. It is read-only after construction and shared across parser threads.

use std::collections::HashMap;

use sheetlogic_primitives::address::{parse_column_only, parse_row_only};
use sheetlogic_primitives::{parse_a1, split_sheet_qualifier, Coordinate, NamedRange, Range, RefTarget};

/// A successfully resolved reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub target: RefTarget,
    /// Set when the token was a named range rather than an address.
    pub name: Option<String>,
}

/// Why a token failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown reference '{0}'")]
    UnknownReference(String),
    #[error("unknown sheet '{0}'")]
    UnknownSheet(String),
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    named: HashMap<String, NamedRange>,
    /// Upper-cased sheet name to its first-seen spelling.
    sheets: HashMap<String, String>,
}

impl ReferenceResolver {
    /// Build a resolver. An empty `sheets` set accepts any sheet name.
    /// Sheet names match case-insensitively and resolve to the first
    /// spelling given.
    pub fn new<I, S>(named_ranges: I, sheets: S) -> Self
    where
        I: IntoIterator<Item = NamedRange>,
        S: IntoIterator<Item = String>,
    {
        let named = named_ranges
            .into_iter()
            .map(|nr| (nr.name.to_ascii_uppercase(), nr))
            .collect();
        let mut by_key = HashMap::new();
        for sheet in sheets {
            by_key.entry(sheet.to_ascii_uppercase()).or_insert(sheet);
        }
        Self { named, sheets: by_key }
    }

    pub fn named_range(&self, name: &str) -> Option<&NamedRange> {
        self.named.get(&name.to_ascii_uppercase())
    }

    pub fn named_ranges(&self) -> impl Iterator<Item = &NamedRange> {
        self.named.values()
    }

    pub fn is_known_sheet(&self, sheet: &str) -> bool {
        self.sheets.is_empty() || self.sheets.contains_key(&sheet.to_ascii_uppercase())
    }

    /// The declared spelling of `sheet`, or `None` when it is unknown.
    /// With no declared sheets every name is its own spelling.
    pub fn canonical_sheet<'a>(&'a self, sheet: &'a str) -> Option<&'a str> {
        if self.sheets.is_empty() {
            return Some(sheet);
        }
        self.sheets.get(&sheet.to_ascii_uppercase()).map(String::as_str)
    }

    /// Resolve a raw token (`B5`, `$B$5`, `Sheet2!B5:D9`, `A:C`, `2:5`, `TaxRate`)
    /// relative to `current_sheet`.
    pub fn resolve(&self, token: &str, current_sheet: &str) -> Result<ResolvedReference, ResolveError> {
        let token = token.trim();
        let (qualifier, address) = split_sheet_qualifier(token);

        if qualifier.is_none() {
            if let Some(named) = self.named_range(address) {
                return Ok(ResolvedReference {
                    target: named.target.clone(),
                    name: Some(named.name.clone()),
                });
            }
        }

        let sheet = match qualifier {
            Some(sheet) => {
                let Some(canonical) = self.canonical_sheet(&sheet).map(str::to_string) else {
                    return Err(ResolveError::UnknownSheet(sheet));
                };
                canonical
            }
            None => self.canonical_sheet(current_sheet).unwrap_or(current_sheet).to_string(),
        };

        resolve_address(&sheet, address)
            .map(|target| ResolvedReference { target, name: None })
            .ok_or_else(|| ResolveError::UnknownReference(token.to_string()))
    }
}

/// Resolve an unqualified address on a known sheet.
fn resolve_address(sheet: &str, address: &str) -> Option<RefTarget> {
    match address.split_once(':') {
        None => {
            let a1 = parse_a1(address).ok()?;
            Some(RefTarget::Cell(Coordinate::new(sheet, a1.column, a1.row)))
        }
        Some((start, end)) => {
            if let (Ok(a), Ok(b)) = (parse_a1(start), parse_a1(end)) {
                let range = Range::new(
                    Coordinate::new(sheet, a.column, a.row),
                    Coordinate::new(sheet, b.column, b.row),
                )
                .ok()?;
                return Some(RefTarget::Range(range));
            }
            if let (Some(a), Some(b)) = (parse_column_only(start), parse_column_only(end)) {
                return Some(RefTarget::Range(Range::whole_columns(sheet, a, b)));
            }
            if let (Some(a), Some(b)) = (parse_row_only(start), parse_row_only(end)) {
                return Some(RefTarget::Range(Range::whole_rows(sheet, a, b)));
            }
            None
        }
    }
}
