// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

use std::borrow::Cow;
use std::fmt;
use std::io::{BufRead, Write};

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use super::configure;
use crate::{
    convert::ConvertOptions,
    datatype::{classify, parse_f64, render_date, render_time, CellValueKind},
    formats::StyleTable,
    number_format::NumberFormat,
    reference::{column_name, row_number, CellReference},
    strings::SharedStrings,
    utils::unescape_entity_to_buffer,
    XlsxError,
};

/// Name to value lookup over the attributes of an opening tag
pub trait AttributeLookup {
    /// Gets the raw value of attribute `key`
    fn attribute(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>, XlsxError>;
}

impl AttributeLookup for BytesStart<'_> {
    fn attribute(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>, XlsxError> {
        for a in self.attributes() {
            let a = a.map_err(XlsxError::XmlAttr)?;
            if a.key.as_ref() == key {
                return Ok(Some(a.value));
            }
        }
        Ok(None)
    }
}

impl AttributeLookup for [(&str, &str)] {
    fn attribute(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>, XlsxError> {
        Ok(self
            .iter()
            .find(|(k, _)| k.as_bytes() == key)
            .map(|(_, v)| Cow::Borrowed(v.as_bytes())))
    }
}

/// Workbook level tables shared read-only by every sheet
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    /// Shared string table
    pub strings: SharedStrings<'a>,
    /// Number formats by style index
    pub styles: &'a StyleTable,
    /// 1904 date system
    pub is_1904: bool,
}

/// What the open value element collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueMode {
    /// `<v>`: every text event
    Plain,
    /// `<is>`: `<t>` runs only, phonetic runs skipped
    Rich,
}

#[derive(Debug, Default)]
struct RowState {
    /// one-based, as written in the sheet
    number: u32,
    open: bool,
    /// outside the row filter, every event is ignored until `</row>`
    skipped: bool,
    last_column: Option<u32>,
    /// column given to a `<c>` without `r`
    next_column: u32,
}

#[derive(Debug)]
struct CellState<'a> {
    column: u32,
    kind: CellValueKind,
    format: Option<&'a NumberFormat>,
    text: String,
    value: Option<ValueMode>,
    in_run_text: bool,
    in_phonetic: bool,
}

impl<'a> CellState<'a> {
    fn new() -> Self {
        CellState {
            column: 0,
            kind: CellValueKind::Number,
            format: None,
            text: String::with_capacity(64),
            value: None,
            in_run_text: false,
            in_phonetic: false,
        }
    }

    fn reset(&mut self, column: u32, kind: CellValueKind, format: Option<&'a NumberFormat>) {
        self.column = column;
        self.kind = kind;
        self.format = format;
        self.text.clear();
        self.value = None;
        self.in_run_text = false;
        self.in_phonetic = false;
    }
}

/// Row/cell state machine writing one line per `<row>` of a worksheet.
///
/// Events are the element local names, attributes and text of the sheet xml,
/// in document order. Output is written field by field; only the text of the
/// current value is buffered.
pub struct SheetHandler<'a, W: Write> {
    out: W,
    context: SheetContext<'a>,
    options: &'a ConvertOptions,
    separator: String,
    row: RowState,
    cell: CellState<'a>,
    rows_written: usize,
}

impl<'a, W: Write> SheetHandler<'a, W> {
    /// Creates a handler writing into `out`
    pub fn new(out: W, context: SheetContext<'a>, options: &'a ConvertOptions) -> Self {
        SheetHandler {
            out,
            context,
            options,
            separator: options.separator().to_string(),
            row: RowState::default(),
            cell: CellState::new(),
            rows_written: 0,
        }
    }

    /// Handles an opening tag
    pub fn start_element<A>(&mut self, name: &[u8], attrs: &A) -> Result<(), XlsxError>
    where
        A: AttributeLookup + ?Sized,
    {
        if self.row.skipped {
            return Ok(());
        }
        match name {
            b"row" => self.open_row(attrs)?,
            // cells outside of a row have no line to go to
            _ if !self.row.open => (),
            b"c" => self.open_cell(attrs)?,
            b"v" | b"inlineStr" => self.open_value(ValueMode::Plain),
            b"is" => self.open_value(ValueMode::Rich),
            b"t" => self.cell.in_run_text = true,
            b"rPh" => self.cell.in_phonetic = true,
            _ => (),
        }
        Ok(())
    }

    /// Handles text content; may be called several times for the same value
    pub fn characters(&mut self, text: &str) {
        if self.row.skipped {
            return;
        }
        match self.cell.value {
            Some(ValueMode::Plain) => self.cell.text.push_str(text),
            Some(ValueMode::Rich) if self.cell.in_run_text && !self.cell.in_phonetic => {
                self.cell.text.push_str(text)
            }
            _ => (),
        }
    }

    /// Handles a closing tag
    pub fn end_element(&mut self, name: &[u8]) -> Result<(), XlsxError> {
        if self.row.skipped {
            if name == b"row" {
                self.row.skipped = false;
                self.row.open = false;
            }
            return Ok(());
        }
        match name {
            b"v" | b"inlineStr" if self.cell.value == Some(ValueMode::Plain) => {
                self.write_value()?
            }
            b"is" if self.cell.value == Some(ValueMode::Rich) => self.write_value()?,
            b"t" => self.cell.in_run_text = false,
            b"rPh" => self.cell.in_phonetic = false,
            b"row" if self.row.open => self.close_row()?,
            _ => (),
        }
        Ok(())
    }

    /// Checks the stream did not stop inside a row
    pub fn finish(&mut self) -> Result<(), XlsxError> {
        if self.row.open && !self.row.skipped {
            return Err(XlsxError::XmlEof("row"));
        }
        Ok(())
    }

    /// Ends a half written line after the sheet was aborted
    pub fn terminate_line(&mut self) -> Result<(), XlsxError> {
        if self.row.open && !self.row.skipped && self.row.last_column.is_some() {
            self.out.write_all(b"\n").map_err(XlsxError::Output)?;
            self.rows_written += 1;
        }
        self.row.open = false;
        self.row.last_column = None;
        Ok(())
    }

    /// Number of lines written so far
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Gives the output sink back
    pub fn into_inner(self) -> W {
        self.out
    }

    fn open_row<A>(&mut self, attrs: &A) -> Result<(), XlsxError>
    where
        A: AttributeLookup + ?Sized,
    {
        let number = match attrs.attribute(b"r")? {
            Some(r) => row_number(&r)?,
            None => self.row.number.saturating_add(1),
        };
        self.row = RowState {
            number,
            open: true,
            skipped: !self.options.selection().contains_row(number),
            last_column: None,
            next_column: 0,
        };
        Ok(())
    }

    fn open_cell<A>(&mut self, attrs: &A) -> Result<(), XlsxError>
    where
        A: AttributeLookup + ?Sized,
    {
        let column = match attrs.attribute(b"r")? {
            Some(r) => CellReference::parse(&r)?.column,
            None => self.row.next_column,
        };
        self.row.next_column = column.saturating_add(1);

        let style = match attrs.attribute(b"s")? {
            Some(s) => match atoi_simd::parse::<usize>(&s) {
                Ok(style) => Some(style),
                Err(_) => {
                    self.warn_at(
                        column,
                        format_args!("invalid style index '{}'", String::from_utf8_lossy(&s)),
                    );
                    None
                }
            },
            None => None,
        };
        let styles = self.context.styles;
        let kind = classify(
            attrs.attribute(b"t")?.as_deref(),
            style,
            styles,
            self.options.classify_policy(),
        );
        let format = match kind {
            CellValueKind::Number => style.and_then(|s| styles.format_for(s)),
            _ => None,
        };
        self.cell.reset(column, kind, format);
        Ok(())
    }

    fn open_value(&mut self, mode: ValueMode) {
        self.cell.text.clear();
        self.cell.value = Some(mode);
        self.cell.in_run_text = false;
        self.cell.in_phonetic = false;
    }

    fn write_value(&mut self) -> Result<(), XlsxError> {
        self.cell.value = None;
        let field = self.render();
        let column = self.cell.column;
        // out of order cells still get their own field
        let separators = match self.row.last_column {
            None => column,
            Some(last) => column.saturating_sub(last).max(1),
        };
        self.write_separators(separators as usize)?;
        self.out
            .write_all(field.as_bytes())
            .map_err(XlsxError::Output)?;
        self.row.last_column = Some(column);
        Ok(())
    }

    fn close_row(&mut self) -> Result<(), XlsxError> {
        if let Some(min_columns) = self.options.min_columns() {
            let last = self.row.last_column.unwrap_or(0) as usize;
            self.write_separators(min_columns.saturating_sub(last))?;
        }
        self.out.write_all(b"\n").map_err(XlsxError::Output)?;
        self.rows_written += 1;
        self.row.open = false;
        self.row.last_column = None;
        self.row.next_column = 0;
        Ok(())
    }

    fn write_separators(&mut self, count: usize) -> Result<(), XlsxError> {
        for _ in 0..count {
            self.out
                .write_all(self.separator.as_bytes())
                .map_err(XlsxError::Output)?;
        }
        Ok(())
    }

    fn render(&self) -> String {
        let raw = self.cell.text.as_str();
        match &self.cell.kind {
            CellValueKind::Boolean => match raw.as_bytes().first() {
                Some(b'0') => "FALSE".to_string(),
                Some(_) => "TRUE".to_string(),
                None => {
                    self.warn_cell(format_args!("empty boolean value"));
                    String::new()
                }
            },
            CellValueKind::Error => quote(&format!("ERROR:{raw}")),
            CellValueKind::Formula
            | CellValueKind::InlineString
            | CellValueKind::DateTime
            | CellValueKind::IsoDateTime => quote(raw),
            CellValueKind::SharedStringIndex => {
                match atoi_simd::parse::<usize>(raw.trim().as_bytes()) {
                    Ok(index) => match self.context.strings.resolve(index) {
                        Some(s) => quote(s),
                        None => {
                            self.warn_cell(format_args!(
                                "shared string index {index} out of range ({} strings)",
                                self.context.strings.len()
                            ));
                            String::new()
                        }
                    },
                    Err(_) => {
                        self.warn_cell(format_args!("shared string index '{raw}' is not a number"));
                        String::new()
                    }
                }
            }
            CellValueKind::Number => match self.cell.format {
                None => raw.to_string(),
                Some(_) if raw.is_empty() => String::new(),
                Some(format) => match parse_f64(raw) {
                    Some(value) => self.quote_if_needed(format.format(value, self.context.is_1904)),
                    None => {
                        self.warn_cell(format_args!("cannot parse number '{raw}'"));
                        String::new()
                    }
                },
            },
            CellValueKind::Date => match render_date(raw, self.context.is_1904) {
                Some(date) => quote(&date),
                None => {
                    self.warn_cell(format_args!("cannot parse date serial '{raw}'"));
                    String::new()
                }
            },
            CellValueKind::Time => match render_time(raw) {
                Some(time) => quote(&time),
                None => {
                    self.warn_cell(format_args!("cannot parse time value '{raw}'"));
                    String::new()
                }
            },
            CellValueKind::Unknown(_) => format!("({})", self.cell.kind),
        }
    }

    /// Formatted numbers are quoted only when they would break the line
    fn quote_if_needed(&self, field: String) -> String {
        if field.contains(self.separator.as_str()) || field.contains(['"', '\n', '\r']) {
            quote(&field)
        } else {
            field
        }
    }

    fn warn_cell(&self, message: fmt::Arguments<'_>) {
        self.warn_at(self.cell.column, message);
    }

    fn warn_at(&self, column: u32, message: fmt::Arguments<'_>) {
        warn!("{}{}: {message}", column_name(column), self.row.number);
    }
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Drives quick-xml events of one sheet into `handler` until the end of the stream
pub fn pump<R, W>(xml: &mut XmlReader<R>, handler: &mut SheetHandler<'_, W>) -> Result<(), XlsxError>
where
    R: BufRead,
    W: Write,
{
    let mut buf = Vec::with_capacity(1024);
    let mut entity = String::new();
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) => handler.start_element(e.local_name().as_ref(), e)?,
            Event::Empty(ref e) => {
                handler.start_element(e.local_name().as_ref(), e)?;
                handler.end_element(e.local_name().as_ref())?;
            }
            Event::End(ref e) => handler.end_element(e.local_name().as_ref())?,
            Event::Text(ref t) => handler.characters(&t.xml10_content()?),
            Event::GeneralRef(ref e) => {
                entity.clear();
                unescape_entity_to_buffer(e, &mut entity)?;
                handler.characters(&entity);
            }
            Event::CData(ref c) => handler.characters(&c.decode()?),
            Event::Eof => break,
            _ => (),
        }
    }
    handler.finish()
}

/// Converts one worksheet xml stream, returning the number of lines written
pub fn convert_sheet_xml<R, W>(
    reader: R,
    out: W,
    context: SheetContext<'_>,
    options: &ConvertOptions,
) -> Result<usize, XlsxError>
where
    R: BufRead,
    W: Write,
{
    let mut xml = configure(XmlReader::from_reader(reader));
    let mut handler = SheetHandler::new(out, context, options);
    pump(&mut xml, &mut handler)?;
    Ok(handler.rows_written())
}
