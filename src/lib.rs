// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Streaming xlsx to csv conversion
//!
//! # Status
//!
//! **xlsx2csv** converts the worksheets of an Excel 2007+ workbook into
//! comma separated text without loading whole sheets in memory. Each sheet's
//! xml is read as a stream of events; cells are written as soon as their
//! value closes.
//!
//! Shared strings are resolved, styled numbers go through their number format
//! and date/time styled numbers are rendered as calendar values.
//!
//! # Examples
//! ```no_run
//! use std::io::stdout;
//! use xlsx2csv::{convert, open_workbook, ConvertOptions};
//!
//! let mut workbook = open_workbook("report.xlsx").expect("Cannot open file");
//! let options = ConvertOptions::default()
//!     .with_min_columns(Some(4))
//!     .with_first_row(Some(2));
//! for report in convert(&mut workbook, &mut stdout().lock(), &options).expect("Cannot convert") {
//!     if let Some(e) = &report.error {
//!         eprintln!("sheet '{}' is incomplete: {}", report.name, e);
//!     }
//! }
//! ```
//!
//! Single sheet xml can also be converted directly, which is mostly useful
//! to test or to plug another container reader:
//!
//! ```
//! use xlsx2csv::{convert_sheet_xml, ConvertOptions, SharedStrings, SheetContext, StyleTable};
//!
//! let xml = r#"<worksheet><sheetData>
//!     <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>42</v></c></row>
//! </sheetData></worksheet>"#;
//! let strings = vec!["name".to_string()];
//! let styles = StyleTable::default();
//! let context = SheetContext { strings: SharedStrings::new(&strings), styles: &styles, is_1904: false };
//!
//! let mut out = Vec::new();
//! let rows = convert_sheet_xml(xml.as_bytes(), &mut out, context, &ConvertOptions::default()).unwrap();
//! assert_eq!(rows, 1);
//! assert_eq!(out, b"\"name\",,42\n");
//! ```
#![deny(missing_docs)]

#[macro_use]
mod utils;

mod convert;
mod datatype;
mod formats;
mod number_format;
mod reference;
mod strings;
mod xlsx;

pub use crate::convert::{convert, ConvertOptions, SheetReport, SheetSelection};
pub use crate::datatype::{
    classify, excel_to_datetime, render_date, render_time, CellValueKind, ClassifyPolicy,
    ErrorCellStyle,
};
pub use crate::formats::{builtin_format, date_category, CellStyle, DateCategory, StyleTable};
pub use crate::number_format::{general as format_general, NumberFormat};
pub use crate::reference::{column_index, column_name, row_number, CellReference};
pub use crate::strings::SharedStrings;
pub use crate::xlsx::{
    convert_sheet_xml, open_workbook, pump, AttributeLookup, SheetContext, SheetHandler,
    XlReader, Xlsx, XlsxError,
};
