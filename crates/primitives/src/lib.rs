//! # Sheetlogic Primitives
//!
//! Core primitives for the formula compiler: resolved cell coordinates,
//! rectangular ranges, named ranges, and evaluated values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub mod address;
pub mod value;

pub use address::{
    column_letters_to_number, column_number_to_letters, parse_a1, sanitize_sheet_name,
    split_sheet_qualifier, A1Address, MAX_COLUMN_COUNT, MAX_ROW_COUNT,
};
pub use value::{format_literal, format_number, ErrorKind, EvaluatedValue, ValueType};

/// A resolved `(sheet, column, row)` cell address. Columns and rows are 1-based.
///
/// Ordering is row-major within a sheet: sheet name first, then row, then column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub sheet: String,
    pub column: u32,
    pub row: u32,
}

impl Coordinate {
    pub fn new(sheet: impl Into<String>, column: u32, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            column,
            row,
        }
    }

    /// Parse an unqualified A1 address on the given sheet.
    pub fn from_a1(sheet: impl Into<String>, a1: &str) -> Result<Self, AddressError> {
        let addr = parse_a1(a1)?;
        Ok(Self::new(sheet, addr.column, addr.row))
    }

    /// A1 text without the sheet qualifier.
    pub fn to_a1(&self) -> String {
        format!("{}{}", column_number_to_letters(self.column), self.row)
    }
}

impl Ord for Coordinate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sheet
            .cmp(&other.sheet)
            .then(self.row.cmp(&other.row))
            .then(self.column.cmp(&other.column))
    }
}

impl PartialOrd for Coordinate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", sanitize_sheet_name(&self.sheet), self.to_a1())
    }
}

impl FromStr for Coordinate {
    type Err = AddressError;

    /// Parse a sheet-qualified address such as `Sheet1!B5` or `'My Sheet'!$B$5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, address) = split_sheet_qualifier(s);
        let sheet = sheet.ok_or_else(|| AddressError::MissingSheet(s.to_string()))?;
        Self::from_a1(sheet, address)
    }
}

// Coordinates serialize as their qualified text so they can key JSON maps.
impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A rectangular range on one sheet. `start` is always the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    start: Coordinate,
    end: Coordinate,
}

impl Range {
    /// Build a range from two corners, normalizing so `start <= end` on both axes.
    pub fn new(a: Coordinate, b: Coordinate) -> Result<Self, AddressError> {
        if a.sheet != b.sheet {
            return Err(AddressError::SheetMismatch(a.sheet, b.sheet));
        }
        let start = Coordinate::new(a.sheet.clone(), a.column.min(b.column), a.row.min(b.row));
        let end = Coordinate::new(a.sheet, a.column.max(b.column), a.row.max(b.row));
        Ok(Self { start, end })
    }

    /// Every row of the given columns (`A:C`).
    pub fn whole_columns(sheet: impl Into<String>, first: u32, last: u32) -> Self {
        let sheet = sheet.into();
        Self {
            start: Coordinate::new(sheet.clone(), first.min(last), 1),
            end: Coordinate::new(sheet, first.max(last), MAX_ROW_COUNT),
        }
    }

    /// Every column of the given rows (`2:5`).
    pub fn whole_rows(sheet: impl Into<String>, first: u32, last: u32) -> Self {
        let sheet = sheet.into();
        Self {
            start: Coordinate::new(sheet.clone(), 1, first.min(last)),
            end: Coordinate::new(sheet, MAX_COLUMN_COUNT, first.max(last)),
        }
    }

    pub fn sheet(&self) -> &str {
        &self.start.sheet
    }

    pub fn start(&self) -> &Coordinate {
        &self.start
    }

    pub fn end(&self) -> &Coordinate {
        &self.end
    }

    pub fn rows(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn columns(&self) -> u32 {
        self.end.column - self.start.column + 1
    }

    /// Total number of cells covered.
    pub fn size(&self) -> u64 {
        u64::from(self.rows()) * u64::from(self.columns())
    }

    pub fn is_whole_columns(&self) -> bool {
        self.start.row == 1 && self.end.row == MAX_ROW_COUNT
    }

    pub fn is_whole_rows(&self) -> bool {
        self.start.column == 1 && self.end.column == MAX_COLUMN_COUNT
    }

    /// Check if a coordinate lies inside this range.
    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.sheet == self.start.sheet
            && coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.column >= self.start.column
            && coord.column <= self.end.column
    }

    /// Lazily iterate every coordinate in row-major order.
    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter {
            range: self,
            row: self.start.row,
            column: self.start.column,
            done: false,
        }
    }

    /// Materialize every coordinate, refusing ranges larger than `max_cells`.
    pub fn expand(&self, max_cells: u64) -> Result<Vec<Coordinate>, AddressError> {
        let cells = self.size();
        if cells > max_cells {
            return Err(AddressError::RangeTooLarge {
                cells,
                max: max_cells,
            });
        }
        Ok(self.iter().collect())
    }

    /// Zero-based (row, column) offset of a coordinate inside the range.
    pub fn offset_of(&self, coord: &Coordinate) -> Option<(u32, u32)> {
        self.contains(coord)
            .then(|| (coord.row - self.start.row, coord.column - self.start.column))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sheet = sanitize_sheet_name(self.sheet());
        if self.is_whole_columns() {
            return write!(
                f,
                "{}!{}:{}",
                sheet,
                column_number_to_letters(self.start.column),
                column_number_to_letters(self.end.column)
            );
        }
        if self.is_whole_rows() {
            return write!(f, "{}!{}:{}", sheet, self.start.row, self.end.row);
        }
        write!(f, "{}!{}:{}", sheet, self.start.to_a1(), self.end.to_a1())
    }
}

/// Iterator over a range in row-major order.
pub struct RangeIter<'a> {
    range: &'a Range,
    row: u32,
    column: u32,
    done: bool,
}

impl Iterator for RangeIter<'_> {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = Coordinate::new(self.range.sheet(), self.column, self.row);
        if self.row == self.range.end.row && self.column == self.range.end.column {
            self.done = true;
        } else if self.column < self.range.end.column {
            self.column += 1;
        } else {
            self.column = self.range.start.column;
            self.row += 1;
        }
        Some(result)
    }
}

/// What a reference or named range points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    Cell(Coordinate),
    Range(Range),
}

impl RefTarget {
    pub fn sheet(&self) -> &str {
        match self {
            Self::Cell(coord) => &coord.sheet,
            Self::Range(range) => range.sheet(),
        }
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        match self {
            Self::Cell(cell) => cell == coord,
            Self::Range(range) => range.contains(coord),
        }
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(coord) => write!(f, "{coord}"),
            Self::Range(range) => write!(f, "{range}"),
        }
    }
}

/// A user-defined alias for a coordinate or range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRange {
    pub name: String,
    pub target: RefTarget,
}

impl NamedRange {
    pub fn new(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// Errors that can occur when parsing addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid column: {0}")]
    InvalidColumn(String),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
    #[error("Address '{0}' has no sheet qualifier")]
    MissingSheet(String),
    #[error("Range corners are on different sheets: {0} and {1}")]
    SheetMismatch(String, String),
    #[error("range too large: {cells} cells (max {max})")]
    RangeTooLarge { cells: u64, max: u64 },
}
