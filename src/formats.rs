use crate::number_format::NumberFormat;

/// Date-like categories of a number format
///
/// Numeric cells whose style resolves to one of these are rendered as
/// calendar values instead of numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCategory {
    /// Calendar date only. Examples: "m/d/yy", "yyyy-mm-dd"
    Date,
    /// Time of day only. Examples: "h:mm:ss AM/PM", "mm:ss"
    Time,
    /// Both date and time. Example: "m/d/yy h:mm"
    DateTime,
}

/// Number format information of a single cell style (`<xf>` of `cellXfs`)
///
/// # References
///
/// - ECMA-376 Part 1, Section 18.8.45 (xf - Format)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellStyle {
    /// `numFmtId` attribute
    pub num_fmt_id: u32,
    /// Format code declared in `numFmts` for this id, if any
    pub format_string: Option<String>,
}

impl CellStyle {
    /// A style using a builtin format id
    pub fn builtin(num_fmt_id: u32) -> Self {
        CellStyle {
            num_fmt_id,
            format_string: None,
        }
    }

    /// A style using a custom format code
    pub fn custom(num_fmt_id: u32, format_string: &str) -> Self {
        CellStyle {
            num_fmt_id,
            format_string: Some(format_string.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedStyle {
    format: Option<NumberFormat>,
    category: Option<DateCategory>,
}

/// Style index to number format lookup, shared read-only by every sheet
///
/// Explicit format codes win over the builtin table; a style whose id is
/// neither declared nor builtin has no format.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    styles: Vec<ResolvedStyle>,
}

impl StyleTable {
    /// Resolves and parses the format of every style once
    pub fn new(styles: Vec<CellStyle>) -> Self {
        let styles = styles
            .into_iter()
            .map(|style| {
                let format = style
                    .format_string
                    .as_deref()
                    .or_else(|| builtin_format(style.num_fmt_id))
                    .map(NumberFormat::parse);
                let category = format.as_ref().and_then(NumberFormat::date_category);
                ResolvedStyle { format, category }
            })
            .collect();
        StyleTable { styles }
    }

    /// Number of styles
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Format code of a style, `None` if the index is out of range or has no format
    pub fn format_string_for(&self, style: usize) -> Option<&str> {
        self.format_for(style).map(NumberFormat::pattern)
    }

    /// Parsed format of a style
    pub fn format_for(&self, style: usize) -> Option<&NumberFormat> {
        self.styles.get(style)?.format.as_ref()
    }

    /// Date category of a style, if its format displays a date or a time
    pub fn date_category(&self, style: usize) -> Option<DateCategory> {
        self.styles.get(style)?.category
    }
}

/// Detect the date category of a format code
///
/// Only the first (positive) section is considered; elapsed durations such as
/// `[h]:mm:ss` are not dates.
///
/// ```
/// use xlsx2csv::{date_category, DateCategory};
///
/// assert_eq!(date_category("yyyy-mm-dd"), Some(DateCategory::Date));
/// assert_eq!(date_category("h:mm AM/PM"), Some(DateCategory::Time));
/// assert_eq!(date_category("0.00%"), None);
/// assert_eq!(date_category("[h]:mm:ss"), None);
/// ```
pub fn date_category(format: &str) -> Option<DateCategory> {
    NumberFormat::parse(format).date_category()
}

/// Format code of a builtin number format id
///
/// Ids 23 to 36 are reserved for locale specific formats and have no code.
///
/// # References
///
/// - ECMA-376 Part 1, Section 18.8.30 (numFmt)
pub fn builtin_format(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        5 => "\"$\"#,##0_);(\"$\"#,##0)",
        6 => "\"$\"#,##0_);[Red](\"$\"#,##0)",
        7 => "\"$\"#,##0.00_);(\"$\"#,##0.00)",
        8 => "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        // mm-dd-yy
        14 => "m/d/yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0_);(#,##0)",
        38 => "#,##0_);[Red](#,##0)",
        39 => "#,##0.00_);(#,##0.00)",
        40 => "#,##0.00_);[Red](#,##0.00)",
        41 => "_(* #,##0_);_(* (#,##0);_(* \"-\"_);_(@_)",
        42 => "_(\"$\"* #,##0_);_(\"$\"* (#,##0);_(\"$\"* \"-\"_);_(@_)",
        43 => "_(* #,##0.00_);_(* (#,##0.00);_(* \"-\"??_);_(@_)",
        44 => "_(\"$\"* #,##0.00_);_(\"$\"* (#,##0.00);_(\"$\"* \"-\"??_);_(@_)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}
