//! Address helpers for spreadsheet-style A1 references.

use crate::AddressError;

pub const MAX_ROW_COUNT: u32 = 1_048_576;
pub const MAX_COLUMN_COUNT: u32 = 16_384;

/// A parsed A1 cell address, 1-based, with anchors stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A1Address {
    pub column: u32,
    pub row: u32,
}

/// Parse `B5`, `$B$5`, `b5` into a 1-based column/row pair.
pub fn parse_a1(address: &str) -> Result<A1Address, AddressError> {
    let trimmed = address.trim();
    let Some((letters, digits)) = find_a1_match(trimmed) else {
        return Err(AddressError::InvalidAddress(trimmed.to_string()));
    };
    let column = column_letters_to_number(&letters)?;
    let row = parse_row_number(&digits)?;
    Ok(A1Address { column, row })
}

/// Gets the 1-based column from a column-only address (e.g., "$G" => 7).
pub fn parse_column_only(address: &str) -> Option<u32> {
    let stripped = address.trim().trim_start_matches('$');
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    column_letters_to_number(stripped).ok()
}

/// Gets the 1-based row from a row-only address (e.g., "$4" => 4).
pub fn parse_row_only(address: &str) -> Option<u32> {
    let stripped = address.trim().trim_start_matches('$');
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    parse_row_number(stripped).ok()
}

/// Split an optional `Sheet!` or `'Quoted Sheet'!` qualifier off a reference.
///
/// Returns the unquoted sheet name (if any) and the remaining address text.
pub fn split_sheet_qualifier(text: &str) -> (Option<String>, &str) {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('\'') {
        // quoted names may contain '!' so scan for the closing quote
        let mut chars = rest.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if ch != '\'' {
                continue;
            }
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                continue;
            }
            let after = &rest[idx + 1..];
            if let Some(address) = after.strip_prefix('!') {
                return (desanitize_sheet_name(&text[..idx + 2]), address);
            }
            return (None, text);
        }
        return (None, text);
    }
    match text.rsplit_once('!') {
        Some((sheet, address)) if !sheet.is_empty() => (Some(sheet.to_string()), address),
        _ => (None, text),
    }
}

/// Quote sheet names containing anything but ASCII alphanumerics and underscores.
pub fn sanitize_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !looks_like_cell(name);
    if plain {
        return name.to_string();
    }
    format!("'{}'", name.replace('\'', "''"))
}

/// Remove single quotes from a sheet name.
pub fn desanitize_sheet_name(name: &str) -> Option<String> {
    let trimmed = name.strip_prefix('\'')?;
    let trimmed = trimmed.strip_suffix('\'')?;
    Some(trimmed.replace("''", "'"))
}

/// Convert a 1-based column number to letters (1 -> A, 26 -> Z, 27 -> AA).
pub fn column_number_to_letters(column: u32) -> String {
    let mut index = column;
    let mut letters = Vec::new();
    while index > 0 {
        let rem = ((index - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters to a 1-based column number (A -> 1, AA -> 27).
pub fn column_letters_to_number(letters: &str) -> Result<u32, AddressError> {
    if letters.is_empty() {
        return Err(AddressError::InvalidColumn(letters.to_string()));
    }
    let mut result: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(AddressError::InvalidColumn(letters.to_string()));
        }
        let value = u32::from(ch.to_ascii_uppercase() as u8 - b'A' + 1);
        result = result
            .checked_mul(26)
            .and_then(|v| v.checked_add(value))
            .ok_or_else(|| AddressError::InvalidColumn(letters.to_string()))?;
    }
    if result > MAX_COLUMN_COUNT {
        return Err(AddressError::InvalidColumn(letters.to_string()));
    }
    Ok(result)
}

fn parse_row_number(digits: &str) -> Result<u32, AddressError> {
    let row: u32 = digits
        .parse()
        .map_err(|_| AddressError::InvalidRow(digits.to_string()))?;
    if row == 0 || row > MAX_ROW_COUNT {
        return Err(AddressError::InvalidRow(digits.to_string()));
    }
    Ok(row)
}

/// True when `name` would read as an in-bounds A1 address.
fn looks_like_cell(name: &str) -> bool {
    find_a1_match(name).is_some_and(|(letters, digits)| {
        column_letters_to_number(&letters).is_ok() && parse_row_number(&digits).is_ok()
    })
}

fn find_a1_match(address: &str) -> Option<(String, String)> {
    let bytes = address.as_bytes();
    let mut j = 0;
    if bytes.get(j) == Some(&b'$') {
        j += 1;
    }
    if j >= bytes.len() || !bytes[j].is_ascii_alphabetic() {
        return None;
    }
    let letters_start = j;
    while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
        j += 1;
    }
    let letters = &address[letters_start..j];
    if j < bytes.len() && bytes[j] == b'$' {
        j += 1;
    }
    let digits_start = j;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if digits_start == j || j != bytes.len() {
        return None;
    }
    let digits = &address[digits_start..j];
    Some((letters.to_ascii_uppercase(), digits.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_a1_strips_anchors() {
        assert_eq!(parse_a1("$B$2").unwrap(), A1Address { column: 2, row: 2 });
        assert_eq!(parse_a1("b$5").unwrap(), A1Address { column: 2, row: 5 });
        assert_eq!(parse_a1("AA10").unwrap(), A1Address { column: 27, row: 10 });
    }

    #[test]
    fn test_parse_a1_invalid() {
        assert!(parse_a1("").is_err());
        assert!(parse_a1("1A").is_err());
        assert!(parse_a1("A0").is_err());
        assert!(parse_a1("A").is_err());
        assert!(parse_a1("A1B").is_err());
        assert!(parse_a1("XFE1").is_err());
    }

    #[test]
    fn test_column_codec() {
        assert_eq!(column_number_to_letters(1), "A");
        assert_eq!(column_number_to_letters(26), "Z");
        assert_eq!(column_number_to_letters(28), "AB");
        assert_eq!(column_letters_to_number("XFD").unwrap(), MAX_COLUMN_COUNT);
        assert!(column_letters_to_number("A!").is_err());
    }

    #[test]
    fn test_split_sheet_qualifier() {
        assert_eq!(
            split_sheet_qualifier("Sheet2!B5:D9"),
            (Some("Sheet2".to_string()), "B5:D9")
        );
        assert_eq!(
            split_sheet_qualifier("'Q1 ''Plan''!'!A1"),
            (Some("Q1 'Plan'!".to_string()), "A1")
        );
        assert_eq!(split_sheet_qualifier("TaxRate"), (None, "TaxRate"));
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("Sheet1"), "Sheet1");
        assert_eq!(sanitize_sheet_name("Sheet 1"), "'Sheet 1'");
        assert_eq!(sanitize_sheet_name("AB12"), "'AB12'");
        assert_eq!(sanitize_sheet_name("Data2024"), "Data2024");
        assert_eq!(sanitize_sheet_name("XFD1"), "'XFD1'");
        assert_eq!(sanitize_sheet_name("XFE1"), "XFE1");
        assert_eq!(sanitize_sheet_name("O'Brien"), "'O''Brien'");
    }
}
