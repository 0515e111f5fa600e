//! Cell and row references ("C7", "AA12") as found in `r` attributes.

use crate::XlsxError;

/// A column-letter / row-number pair parsed from a cell reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellReference {
    /// Zero-based column index
    pub column: u32,
    /// One-based row number, as written in the sheet
    pub row: u32,
}

impl CellReference {
    /// Parses a reference such as `"C7"`.
    ///
    /// The split point is the first digit. The letter prefix must be a non-empty
    /// run of `A`..=`Z` and the remainder a positive decimal number; anything else
    /// is reported as [`XlsxError::MalformedReference`].
    ///
    /// ```
    /// use xlsx2csv::CellReference;
    ///
    /// let r = CellReference::parse(b"AA12").unwrap();
    /// assert_eq!((r.column, r.row), (26, 12));
    /// ```
    pub fn parse(reference: &[u8]) -> Result<CellReference, XlsxError> {
        let split = first_digit(reference)?;
        let column = column_index(&reference[..split])
            .ok_or_else(|| malformed(reference))?;
        let row = parse_row(&reference[split..]).ok_or_else(|| malformed(reference))?;
        Ok(CellReference { column, row })
    }
}

/// Parses the row number of a `<row r="..">` attribute.
///
/// Uses the same first-digit rule as cell references; any letter prefix is ignored.
pub fn row_number(reference: &[u8]) -> Result<u32, XlsxError> {
    let split = first_digit(reference)?;
    parse_row(&reference[split..]).ok_or_else(|| malformed(reference))
}

/// Converts a column name such as `"AA"` into its zero-based index.
///
/// Base-26 with `A = 0`: `index = (index + 1) * 26 + (c - 'A')` starting from -1.
/// Returns `None` for an empty name, a non `A`..=`Z` byte or an index overflowing `u32`.
///
/// ```
/// use xlsx2csv::column_index;
///
/// assert_eq!(column_index(b"A"), Some(0));
/// assert_eq!(column_index(b"AA"), Some(26));
/// assert_eq!(column_index(b"a"), None);
/// ```
pub fn column_index(name: &[u8]) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut index: i64 = -1;
    for &c in name {
        if !c.is_ascii_uppercase() {
            return None;
        }
        index = (index + 1) * 26 + i64::from(c - b'A');
        if index > i64::from(u32::MAX) {
            return None;
        }
    }
    u32::try_from(index).ok()
}

/// Converts a zero-based column index back into its name.
pub fn column_name(mut index: u32) -> String {
    let mut name = Vec::with_capacity(3);
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    // only ascii letters were pushed
    String::from_utf8_lossy(&name).into_owned()
}

fn first_digit(reference: &[u8]) -> Result<usize, XlsxError> {
    reference
        .iter()
        .position(u8::is_ascii_digit)
        .ok_or_else(|| malformed(reference))
}

fn parse_row(digits: &[u8]) -> Option<u32> {
    match atoi_simd::parse::<u32>(digits) {
        Ok(0) | Err(_) => None,
        Ok(row) => Some(row),
    }
}

fn malformed(reference: &[u8]) -> XlsxError {
    XlsxError::MalformedReference(String::from_utf8_lossy(reference).into_owned())
}
