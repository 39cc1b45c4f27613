use sheetlogic_primitives::address::{parse_column_only, parse_row_only};
use sheetlogic_primitives::{
    split_sheet_qualifier, Coordinate, NamedRange, Range, RefTarget, MAX_ROW_COUNT,
};

#[test]
fn test_coordinate_from_qualified_text() {
    let coord: Coordinate = "Sheet2!$B$5".parse().expect("coordinate");
    assert_eq!(coord, Coordinate::new("Sheet2", 2, 5));
}

#[test]
fn test_column_and_row_only_parts() {
    assert_eq!(parse_column_only("$D"), Some(4));
    assert_eq!(parse_column_only("D4"), None);
    assert_eq!(parse_row_only("$12"), Some(12));
    assert_eq!(parse_row_only("0"), None);
}

#[test]
fn test_sheet_qualifier_with_range_text() {
    let (sheet, rest) = split_sheet_qualifier("'Tax Tables'!A1:B9");
    assert_eq!(sheet.as_deref(), Some("Tax Tables"));
    assert_eq!(rest, "A1:B9");
}

#[test]
fn test_range_expand_and_contains_agree() {
    let range = Range::new(
        Coordinate::new("Sheet1", 2, 5),
        Coordinate::new("Sheet1", 4, 9),
    )
    .expect("range");
    let cells = range.expand(100).expect("expand");
    assert_eq!(cells.len() as u64, range.size());
    assert!(cells.iter().all(|c| range.contains(c)));
    let mut sorted = cells.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, cells);
}

#[test]
fn test_whole_row_range_display() {
    let range = Range::whole_rows("Data", 2, 5);
    assert_eq!(range.to_string(), "Data!2:5");
    assert!(range.contains(&Coordinate::new("Data", 9000, 3)));
    assert!(!range.contains(&Coordinate::new("Data", 1, 6)));
    assert_eq!(Range::whole_columns("Data", 1, 2).end().row, MAX_ROW_COUNT);
}

#[test]
fn test_named_range_target_contains() {
    let named = NamedRange::new(
        "TaxRate",
        RefTarget::Cell(Coordinate::new("Config", 2, 1)),
    );
    assert!(named.target.contains(&Coordinate::new("Config", 2, 1)));
    assert_eq!(named.target.sheet(), "Config");
}
