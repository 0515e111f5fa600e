//! Sheet iteration: header lines, sheet and row selection, per sheet reports

use std::io::{Read, Seek, Write};

use log::{debug, info, warn};
use regex::Regex;

use crate::datatype::{ClassifyPolicy, ErrorCellStyle};
use crate::xlsx::{Xlsx, XlsxError};

/// Which sheets and rows are converted
///
/// Row bounds are one-based and inclusive.
#[derive(Debug, Clone, Default)]
pub struct SheetSelection {
    /// First row written, if bounded
    pub first_row: Option<u32>,
    /// Last row written, if bounded
    pub last_row: Option<u32>,
    /// Sheets whose whole name matches are converted
    pub sheet_pattern: Option<Regex>,
}

impl SheetSelection {
    /// Is the one-based row `row` inside the bounds
    pub fn contains_row(&self, row: u32) -> bool {
        self.first_row.is_none_or(|first| row >= first)
            && self.last_row.is_none_or(|last| row <= last)
    }

    /// Is the sheet converted
    pub fn matches_sheet(&self, name: &str) -> bool {
        self.sheet_pattern.as_ref().is_none_or(|p| p.is_match(name))
    }
}

/// Conversion settings
///
/// ```
/// use xlsx2csv::ConvertOptions;
///
/// let options = ConvertOptions::default()
///     .with_min_columns(Some(3))
///     .with_first_row(Some(2))
///     .with_sheet_pattern("Data.*")
///     .unwrap();
/// assert!(options.selection().matches_sheet("Data 2024"));
/// assert!(!options.selection().matches_sheet("Old Data"));
/// assert!(!options.selection().contains_row(1));
/// ```
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    min_columns: Option<usize>,
    selection: SheetSelection,
    separator: char,
    error_style: ErrorCellStyle,
    detect_dates: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            min_columns: None,
            selection: SheetSelection::default(),
            separator: ',',
            error_style: ErrorCellStyle::default(),
            detect_dates: true,
        }
    }
}

impl ConvertOptions {
    /// Pads every line up to `min_columns` fields
    pub fn with_min_columns(mut self, min_columns: Option<usize>) -> Self {
        self.min_columns = min_columns;
        self
    }

    /// Skips rows before `first_row`
    pub fn with_first_row(mut self, first_row: Option<u32>) -> Self {
        self.selection.first_row = first_row;
        self
    }

    /// Skips rows after `last_row`
    pub fn with_last_row(mut self, last_row: Option<u32>) -> Self {
        self.selection.last_row = last_row;
        self
    }

    /// Only converts sheets whose whole name matches `pattern`
    pub fn with_sheet_pattern(mut self, pattern: &str) -> Result<Self, XlsxError> {
        self.selection.sheet_pattern = Some(Regex::new(&format!("^(?:{pattern})$"))?);
        Ok(self)
    }

    /// Field separator, `,` by default
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// How error cells render
    pub fn with_error_style(mut self, error_style: ErrorCellStyle) -> Self {
        self.error_style = error_style;
        self
    }

    /// Whether numbers with a date or time format render as calendar values
    pub fn with_date_detection(mut self, detect_dates: bool) -> Self {
        self.detect_dates = detect_dates;
        self
    }

    /// Minimum number of fields per line
    pub fn min_columns(&self) -> Option<usize> {
        self.min_columns
    }

    /// Sheet and row selection
    pub fn selection(&self) -> &SheetSelection {
        &self.selection
    }

    /// Field separator
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Cell classification switches
    pub fn classify_policy(&self) -> ClassifyPolicy {
        ClassifyPolicy {
            error_style: self.error_style,
            detect_dates: self.detect_dates,
        }
    }
}

/// Outcome of one converted sheet
#[derive(Debug)]
pub struct SheetReport {
    /// Sheet name
    pub name: String,
    /// Zero-based position in the workbook
    pub index: usize,
    /// Lines written
    pub rows: usize,
    /// Error which cut the sheet short
    pub error: Option<XlsxError>,
}

impl SheetReport {
    /// Was the whole sheet converted
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Converts every selected sheet of `xlsx` into `out`.
///
/// Each sheet starts with a `<name> [index=<i>]:` line. A sheet local error
/// stops that sheet only and is kept in its report; the run goes on with the
/// next sheet. Output errors stop the run.
pub fn convert<RS, W>(
    xlsx: &mut Xlsx<RS>,
    out: &mut W,
    options: &ConvertOptions,
) -> Result<Vec<SheetReport>, XlsxError>
where
    RS: Read + Seek,
    W: Write,
{
    let sheets = xlsx.sheets().to_vec();
    let mut reports = Vec::with_capacity(sheets.len());
    for (index, (name, path)) in sheets.into_iter().enumerate() {
        if !options.selection().matches_sheet(&name) {
            debug!("skipping sheet '{name}'");
            continue;
        }
        writeln!(out, "{name} [index={index}]:").map_err(XlsxError::Output)?;
        debug!("converting sheet '{name}' ({path})");
        let (rows, error) = xlsx.write_sheet_csv(&path, out, options)?;
        match &error {
            None => info!("sheet '{name}': {rows} rows"),
            Some(e) => warn!("sheet '{name}' stopped after {rows} rows: {e}"),
        }
        reports.push(SheetReport {
            name,
            index,
            rows,
            error,
        });
    }
    out.flush().map_err(XlsxError::Output)?;
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, 1, true)]
    #[case(Some(5), Some(13), 4, false)]
    #[case(Some(5), Some(13), 5, true)]
    #[case(Some(5), Some(13), 13, true)]
    #[case(Some(5), Some(13), 14, false)]
    #[case(None, Some(2), 1, true)]
    #[case(Some(2), None, 1000, true)]
    fn test_contains_row(
        #[case] first_row: Option<u32>,
        #[case] last_row: Option<u32>,
        #[case] row: u32,
        #[case] expected: bool,
    ) {
        let options = ConvertOptions::default()
            .with_first_row(first_row)
            .with_last_row(last_row);
        assert_eq!(options.selection().contains_row(row), expected);
    }

    #[test]
    fn test_sheet_pattern() {
        let options = ConvertOptions::default();
        assert!(options.selection().matches_sheet("anything"));

        let options = options.with_sheet_pattern("Sheet[0-9]+").unwrap();
        assert!(options.selection().matches_sheet("Sheet12"));
        assert!(!options.selection().matches_sheet("Sheet"));
        assert!(!options.selection().matches_sheet("MySheet1"));
        assert!(!options.selection().matches_sheet("Sheet1 copy"));

        let options = ConvertOptions::default().with_sheet_pattern("a|b").unwrap();
        assert!(options.selection().matches_sheet("b"));
        assert!(!options.selection().matches_sheet("ab"));

        assert!(matches!(
            ConvertOptions::default().with_sheet_pattern("("),
            Err(XlsxError::Pattern(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let options = ConvertOptions::default();
        assert_eq!(options.separator(), ',');
        assert_eq!(options.min_columns(), None);
        assert_eq!(options.classify_policy(), ClassifyPolicy::default());
    }
}
