use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::formats::{DateCategory, StyleTable};

/// https://learn.microsoft.com/en-us/office/troubleshoot/excel/1900-and-1904-date-system
const EXCEL_1900_1904_DIFF: f64 = 1462.;

const MS_MULTIPLIER: f64 = 24f64 * 60f64 * 60f64 * 1e+3f64;

/// Largest serial Excel accepts (9999-12-31)
const MAX_SERIAL: f64 = 2_958_466.;

/// How a cell's raw value text must be rendered
///
/// Decided when the cell opens and fixed until the next cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValueKind {
    /// `t="b"`
    Boolean,
    /// `t="e"`, rendered as `"ERROR:<raw>"`
    Error,
    /// `t="str"`, a formula cached string, always quoted
    Formula,
    /// `t="inlineStr"`
    InlineString,
    /// `t="s"`
    SharedStringIndex,
    /// `t="n"` or no type
    Number,
    /// Number whose style displays a calendar date
    Date,
    /// Number whose style displays a time of day
    Time,
    /// Number whose style displays both; the raw text is kept
    DateTime,
    /// `t="d"`, ISO 8601 text
    IsoDateTime,
    /// Any other type code
    Unknown(String),
}

impl fmt::Display for CellValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValueKind::Boolean => write!(f, "boolean"),
            CellValueKind::Error => write!(f, "error"),
            CellValueKind::Formula => write!(f, "formula"),
            CellValueKind::InlineString => write!(f, "inline string"),
            CellValueKind::SharedStringIndex => write!(f, "shared string"),
            CellValueKind::Number => write!(f, "number"),
            CellValueKind::Date => write!(f, "date"),
            CellValueKind::Time => write!(f, "time"),
            CellValueKind::DateTime => write!(f, "datetime"),
            CellValueKind::IsoDateTime => write!(f, "iso datetime"),
            CellValueKind::Unknown(code) => write!(f, "unexpected type: {code}"),
        }
    }
}

/// Rendering policy for error cells (`t="e"`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorCellStyle {
    /// `"ERROR:#DIV/0!"`
    #[default]
    Wrapped,
    /// `"#DIV/0!"`, same as a formula string
    Quoted,
}

/// Classification switches, set from the conversion options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyPolicy {
    /// How `t="e"` cells render
    pub error_style: ErrorCellStyle,
    /// Whether date-styled numbers become Date/Time/DateTime
    pub detect_dates: bool,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        ClassifyPolicy {
            error_style: ErrorCellStyle::default(),
            detect_dates: true,
        }
    }
}

/// Decides the [`CellValueKind`] of a cell from its `t` attribute and parsed `s` index.
///
/// An explicit type always wins over the style; the style is only consulted for
/// numeric cells.
///
/// ```
/// use xlsx2csv::{classify, CellStyle, CellValueKind, ClassifyPolicy, StyleTable};
///
/// let styles = StyleTable::new(vec![CellStyle::builtin(0), CellStyle::builtin(14)]);
/// let policy = ClassifyPolicy::default();
/// assert_eq!(classify(Some(b"s".as_slice()), Some(1), &styles, policy), CellValueKind::SharedStringIndex);
/// assert_eq!(classify(None, Some(1), &styles, policy), CellValueKind::Date);
/// assert_eq!(classify(None, Some(0), &styles, policy), CellValueKind::Number);
/// ```
pub fn classify(
    type_attr: Option<&[u8]>,
    style: Option<usize>,
    styles: &StyleTable,
    policy: ClassifyPolicy,
) -> CellValueKind {
    match type_attr {
        Some(b"b") => CellValueKind::Boolean,
        Some(b"e") => match policy.error_style {
            ErrorCellStyle::Wrapped => CellValueKind::Error,
            ErrorCellStyle::Quoted => CellValueKind::Formula,
        },
        Some(b"inlineStr") => CellValueKind::InlineString,
        Some(b"s") => CellValueKind::SharedStringIndex,
        Some(b"str") => CellValueKind::Formula,
        Some(b"d") => CellValueKind::IsoDateTime,
        None | Some(b"n") => {
            let category = style
                .filter(|_| policy.detect_dates)
                .and_then(|s| styles.date_category(s));
            match category {
                Some(DateCategory::Date) => CellValueKind::Date,
                Some(DateCategory::Time) => CellValueKind::Time,
                Some(DateCategory::DateTime) => CellValueKind::DateTime,
                None => CellValueKind::Number,
            }
        }
        Some(code) => CellValueKind::Unknown(String::from_utf8_lossy(code).into_owned()),
    }
}

/// Converts an Excel serial value into a date time.
///
/// The 1900 system reproduces the 1900-02-29 bug: serials below 60 are one day early.
pub fn excel_to_datetime(value: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !value.is_finite() || value.abs() > MAX_SERIAL {
        return None;
    }
    let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let f = if is_1904 {
        value + EXCEL_1900_1904_DIFF
    } else {
        value
    };
    let f = if f >= 60.0 { f } else { f + 1.0 };
    let ms = f * MS_MULTIPLIER;
    let excel_duration = chrono::Duration::milliseconds(ms.round() as i64);
    excel_epoch.checked_add_signed(excel_duration)
}

/// Parses a numeric cell value
pub(crate) fn parse_f64(raw: &str) -> Option<f64> {
    fast_float2::parse::<f64, _>(raw.trim().as_bytes()).ok()
}

/// Renders a serial day count as `M/D/YYYY`; any time part is dropped
pub fn render_date(raw: &str, is_1904: bool) -> Option<String> {
    let days = parse_f64(raw)?.floor();
    let date = excel_to_datetime(days, is_1904)?;
    Some(date.format("%-m/%-d/%Y").to_string())
}

/// Renders the fractional part of a serial value as `hh:mm:ss AM/PM`
pub fn render_time(raw: &str) -> Option<String> {
    let fraction = parse_f64(raw)?.fract();
    let time = excel_to_datetime(fraction, false)?.time();
    Some(time.format("%I:%M:%S %p").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::CellStyle;
    use rstest::rstest;

    fn styles() -> StyleTable {
        StyleTable::new(vec![
            CellStyle::builtin(0),
            CellStyle::builtin(14),
            CellStyle::builtin(21),
            CellStyle::builtin(22),
            CellStyle::builtin(9),
        ])
    }

    #[rstest]
    #[case(Some(&b"b"[..]), Some(1), CellValueKind::Boolean)]
    #[case(Some(&b"e"[..]), None, CellValueKind::Error)]
    #[case(Some(&b"inlineStr"[..]), None, CellValueKind::InlineString)]
    #[case(Some(&b"s"[..]), Some(1), CellValueKind::SharedStringIndex)]
    #[case(Some(&b"str"[..]), Some(2), CellValueKind::Formula)]
    #[case(Some(&b"d"[..]), None, CellValueKind::IsoDateTime)]
    #[case(Some(&b"n"[..]), Some(1), CellValueKind::Date)]
    #[case(None, Some(1), CellValueKind::Date)]
    #[case(None, Some(2), CellValueKind::Time)]
    #[case(None, Some(3), CellValueKind::DateTime)]
    #[case(None, Some(4), CellValueKind::Number)]
    #[case(None, Some(99), CellValueKind::Number)]
    #[case(None, None, CellValueKind::Number)]
    #[case(Some(&b"x"[..]), None, CellValueKind::Unknown("x".to_string()))]
    fn test_classify(
        #[case] typ: Option<&[u8]>,
        #[case] style: Option<usize>,
        #[case] expected: CellValueKind,
    ) {
        assert_eq!(
            classify(typ, style, &styles(), ClassifyPolicy::default()),
            expected
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            CellValueKind::Unknown("x".to_string()).to_string(),
            "unexpected type: x"
        );
        assert_eq!(CellValueKind::SharedStringIndex.to_string(), "shared string");
    }

    #[test]
    fn test_classify_policy() {
        let policy = ClassifyPolicy {
            error_style: ErrorCellStyle::Quoted,
            detect_dates: false,
        };
        assert_eq!(
            classify(Some(b"e".as_slice()), None, &styles(), policy),
            CellValueKind::Formula
        );
        assert_eq!(
            classify(None, Some(1), &styles(), policy),
            CellValueKind::Number
        );
    }

    #[test]
    fn test_dates() {
        let unix_epoch = excel_to_datetime(25569., false);
        assert_eq!(
            unix_epoch,
            Some(NaiveDateTime::new(
                NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            ))
        );

        // serial values are not exact in binary
        let precision = excel_to_datetime(44484.7916666667, false);
        assert_eq!(
            precision,
            Some(NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2021, 10, 15).unwrap(),
                NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            ))
        );

        let before_leap_bug = excel_to_datetime(59., false).map(|d| d.date());
        assert_eq!(before_leap_bug, NaiveDate::from_ymd_opt(1900, 2, 28));

        let date_1904 = excel_to_datetime(0., true).map(|d| d.date());
        assert_eq!(date_1904, NaiveDate::from_ymd_opt(1904, 1, 1));

        assert_eq!(excel_to_datetime(f64::NAN, false), None);
        assert_eq!(excel_to_datetime(1e20, false), None);
    }

    #[rstest]
    #[case("44484", false, Some("10/15/2021"))]
    #[case("44484.75", false, Some("10/15/2021"))]
    #[case("1", false, Some("1/1/1900"))]
    #[case("43022", true, Some("10/15/2021"))]
    #[case("abc", false, None)]
    fn test_render_date(#[case] raw: &str, #[case] is_1904: bool, #[case] expected: Option<&str>) {
        assert_eq!(render_date(raw, is_1904).as_deref(), expected);
    }

    #[rstest]
    #[case("0.75", Some("06:00:00 PM"))]
    #[case("0", Some("12:00:00 AM"))]
    #[case("44484.5", Some("12:00:00 PM"))]
    #[case("0.000011574", Some("12:00:01 AM"))]
    #[case("", None)]
    fn test_render_time(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(render_time(raw).as_deref(), expected);
    }
}
