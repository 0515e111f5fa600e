mod cells_reader;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::path::Path;

use log::debug;
use quick_xml::{
    events::{attributes::Attribute, Event},
    name::QName,
    Reader as XmlReader,
};
use zip::read::{ZipArchive, ZipFile};
use zip::result::ZipError;

use crate::convert::ConvertOptions;
use crate::formats::{CellStyle, StyleTable};
use crate::strings::SharedStrings;
use crate::utils::unescape_entity_to_buffer;

pub use cells_reader::{convert_sheet_xml, pump, AttributeLookup, SheetContext, SheetHandler};

/// Xml event reader over one zip entry
pub type XlReader<'a, RS> = XmlReader<BufReader<ZipFile<'a, RS>>>;

/// An enum for conversion errors
#[derive(Debug)]
pub enum XlsxError {
    /// Io error while reading the package
    Io(std::io::Error),
    /// Io error while writing the converted text
    Output(std::io::Error),
    /// Zip error
    Zip(zip::result::ZipError),
    /// Xml error
    Xml(quick_xml::Error),
    /// Xml attribute error
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// XML Encoding error
    Encoding(quick_xml::encoding::EncodingError),
    /// Unexpected end of xml
    XmlEof(&'static str),
    /// File not found
    FileNotFound(String),
    /// Relationship not found
    RelationshipNotFound,
    /// Row or cell reference without a valid column/row split
    MalformedReference(String),
    /// Invalid sheet name pattern
    Pattern(regex::Error),
    /// Unrecognized data
    Unrecognized {
        /// data type
        typ: &'static str,
        /// value found
        val: String,
    },
}

from_err!(std::io::Error, XlsxError, Io);
from_err!(zip::result::ZipError, XlsxError, Zip);
from_err!(quick_xml::Error, XlsxError, Xml);
from_err!(quick_xml::encoding::EncodingError, XlsxError, Encoding);
from_err!(quick_xml::events::attributes::AttrError, XlsxError, XmlAttr);
from_err!(regex::Error, XlsxError, Pattern);

impl XlsxError {
    /// Whether the error only aborts the sheet being converted.
    ///
    /// Output failures and container level zip errors abort the whole run. Zip
    /// errors raised while opening a single sheet entry are reported for that
    /// sheet only.
    pub fn is_sheet_local(&self) -> bool {
        !matches!(
            self,
            XlsxError::Output(_) | XlsxError::Zip(_) | XlsxError::Pattern(_)
        )
    }
}

impl std::fmt::Display for XlsxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XlsxError::Io(e) => write!(f, "I/O error: {e}"),
            XlsxError::Output(e) => write!(f, "Output error: {e}"),
            XlsxError::Zip(e) => write!(f, "Zip error: {e}"),
            XlsxError::Xml(e) => write!(f, "Xml error: {e}"),
            XlsxError::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            XlsxError::Encoding(e) => write!(f, "XML encoding error: {e}"),
            XlsxError::XmlEof(e) => write!(f, "Unexpected end of xml, expecting '</{e}>'"),
            XlsxError::FileNotFound(e) => write!(f, "File not found '{e}'"),
            XlsxError::RelationshipNotFound => write!(f, "Relationship not found"),
            XlsxError::MalformedReference(r) => {
                write!(f, "Malformed cell reference '{r}', expecting letters then a row number")
            }
            XlsxError::Pattern(e) => write!(f, "Invalid sheet pattern: {e}"),
            XlsxError::Unrecognized { typ, val } => write!(f, "Unrecognized {typ}: {val}"),
        }
    }
}

impl std::error::Error for XlsxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsxError::Io(e) | XlsxError::Output(e) => Some(e),
            XlsxError::Zip(e) => Some(e),
            XlsxError::Xml(e) => Some(e),
            XlsxError::XmlAttr(e) => Some(e),
            XlsxError::Encoding(e) => Some(e),
            XlsxError::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

/// A struct representing xml zipped excel file
/// Xlsx, Xlsm, Xlam
///
/// Only what the converter needs is loaded up front: shared strings, number
/// formats, sheet names and paths, and the date system.
pub struct Xlsx<RS> {
    zip: ZipArchive<RS>,
    /// Shared strings
    strings: Vec<String>,
    /// Number formats by style index
    styles: StyleTable,
    /// Sheets names and paths
    sheets: Vec<(String, String)>,
    /// 1904 datetime system
    is_1904: bool,
}

impl<RS: Read + Seek> Xlsx<RS> {
    /// Opens the package and reads its workbook level parts
    pub fn new(reader: RS) -> Result<Self, XlsxError> {
        let mut xlsx = Xlsx {
            zip: ZipArchive::new(reader)?,
            strings: Vec::new(),
            styles: StyleTable::default(),
            sheets: Vec::new(),
            is_1904: false,
        };
        xlsx.read_shared_strings()?;
        xlsx.read_styles()?;
        let relationships = xlsx.read_relationships()?;
        xlsx.read_workbook(&relationships)?;
        debug!(
            "workbook: {} sheets, {} shared strings, {} styles, 1904: {}",
            xlsx.sheets.len(),
            xlsx.strings.len(),
            xlsx.styles.len(),
            xlsx.is_1904
        );
        Ok(xlsx)
    }

    fn read_shared_strings(&mut self) -> Result<(), XlsxError> {
        let mut xml = match xml_reader(&mut self.zip, "xl/sharedStrings.xml") {
            None => return Ok(()),
            Some(x) => x?,
        };
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"si" => {
                    // an empty <si> still takes an index
                    let s = read_string(&mut xml, e.name())?;
                    self.strings.push(s.unwrap_or_default());
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sst" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("sst")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }

    fn read_styles(&mut self) -> Result<(), XlsxError> {
        let mut xml = match xml_reader(&mut self.zip, "xl/styles.xml") {
            None => return Ok(()),
            Some(x) => x?,
        };

        let mut number_formats = BTreeMap::new();
        let mut styles = Vec::new();

        let mut buf = Vec::with_capacity(1024);
        let mut inner_buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmts" => loop {
                    inner_buf.clear();
                    match xml.read_event_into(&mut inner_buf) {
                        Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmt" => {
                            let mut id = 0u32;
                            let mut format = String::new();
                            for a in e.attributes() {
                                let a = a.map_err(XlsxError::XmlAttr)?;
                                match a {
                                    Attribute {
                                        key: QName(b"numFmtId"),
                                        value: ref v,
                                    } => id = atoi_simd::parse::<u32>(v).unwrap_or(0),
                                    Attribute {
                                        key: QName(b"formatCode"),
                                        ..
                                    } => {
                                        format = a.decode_and_unescape_value(xml.decoder())?.into_owned()
                                    }
                                    _ => (),
                                }
                            }
                            if !format.is_empty() {
                                number_formats.insert(id, format);
                            }
                        }
                        Ok(Event::End(ref e)) if e.local_name().as_ref() == b"numFmts" => break,
                        Ok(Event::Eof) => return Err(XlsxError::XmlEof("numFmts")),
                        Err(e) => return Err(XlsxError::Xml(e)),
                        _ => (),
                    }
                },
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"cellXfs" => loop {
                    inner_buf.clear();
                    match xml.read_event_into(&mut inner_buf) {
                        Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"xf" => {
                            let mut num_fmt_id = 0;
                            for a in e.attributes() {
                                if let Attribute {
                                    key: QName(b"numFmtId"),
                                    value: v,
                                } = a.map_err(XlsxError::XmlAttr)?
                                {
                                    num_fmt_id = atoi_simd::parse::<u32>(&v).unwrap_or(0);
                                }
                            }
                            styles.push(CellStyle {
                                num_fmt_id,
                                format_string: number_formats.get(&num_fmt_id).cloned(),
                            });
                        }
                        Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => break,
                        Ok(Event::Eof) => return Err(XlsxError::XmlEof("cellXfs")),
                        Err(e) => return Err(XlsxError::Xml(e)),
                        _ => (),
                    }
                },
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"styleSheet" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("styleSheet")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }

        self.styles = StyleTable::new(styles);
        Ok(())
    }

    fn read_workbook(
        &mut self,
        relationships: &BTreeMap<Vec<u8>, String>,
    ) -> Result<(), XlsxError> {
        let mut xml = match xml_reader(&mut self.zip, "xl/workbook.xml") {
            None => return Ok(()),
            Some(x) => x?,
        };
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = String::new();
                    let mut path = String::new();
                    for a in e.attributes() {
                        let a = a.map_err(XlsxError::XmlAttr)?;
                        match a {
                            Attribute {
                                key: QName(b"name"),
                                ..
                            } => {
                                name = a.decode_and_unescape_value(xml.decoder())?.to_string();
                            }
                            Attribute {
                                key: QName(b"r:id"),
                                value: v,
                            }
                            | Attribute {
                                key: QName(b"relationships:id"),
                                value: v,
                            } => {
                                let r = &relationships
                                    .get(&*v)
                                    .ok_or(XlsxError::RelationshipNotFound)?[..];
                                // target may have pre-prended "/xl/" or "xl/" path;
                                // strip if present
                                path = if let Some(stripped) = r.strip_prefix('/') {
                                    stripped.to_string()
                                } else if r.starts_with("xl/") {
                                    r.to_string()
                                } else {
                                    format!("xl/{r}")
                                };
                            }
                            _ => (),
                        }
                    }
                    match path.split('/').nth(1) {
                        Some("worksheets" | "chartsheets" | "dialogsheets" | "macrosheets") => {}
                        _ => {
                            return Err(XlsxError::Unrecognized {
                                typ: "sheet:type",
                                val: path,
                            })
                        }
                    }
                    self.sheets.push((name, path));
                }
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"workbookPr" => {
                    self.is_1904 = match e.try_get_attribute("date1904")? {
                        Some(c) => ["1", "true"].contains(
                            &c.decode_and_unescape_value(xml.decoder())
                                .map_err(XlsxError::Xml)?
                                .as_ref(),
                        ),
                        None => false,
                    };
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"workbook" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("workbook")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }

    fn read_relationships(&mut self) -> Result<BTreeMap<Vec<u8>, String>, XlsxError> {
        let mut xml = match xml_reader(&mut self.zip, "xl/_rels/workbook.xml.rels") {
            None => {
                return Err(XlsxError::FileNotFound(
                    "xl/_rels/workbook.xml.rels".to_string(),
                ));
            }
            Some(x) => x?,
        };
        let mut relationships = BTreeMap::new();
        let mut buf = Vec::with_capacity(64);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                    let mut id = Vec::new();
                    let mut target = String::new();
                    for a in e.attributes() {
                        match a.map_err(XlsxError::XmlAttr)? {
                            Attribute {
                                key: QName(b"Id"),
                                value: v,
                            } => id.extend_from_slice(&v),
                            Attribute {
                                key: QName(b"Target"),
                                value: v,
                            } => target = xml.decoder().decode(&v)?.into_owned(),
                            _ => (),
                        }
                    }
                    relationships.insert(id, target);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"Relationships" => break,
                Ok(Event::Eof) => return Err(XlsxError::XmlEof("Relationships")),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        }
        Ok(relationships)
    }

    /// Sheet names and zip paths, in workbook order
    pub fn sheets(&self) -> &[(String, String)] {
        &self.sheets
    }

    /// Sheet names, in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Whether the workbook uses the 1904 date system
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// The shared string table
    pub fn shared_strings(&self) -> SharedStrings<'_> {
        SharedStrings::new(&self.strings)
    }

    /// Number formats by style index
    pub fn styles(&self) -> &StyleTable {
        &self.styles
    }

    /// Opens the xml event reader of one sheet, `path` as returned by [`Xlsx::sheets`]
    pub fn worksheet_xml(&mut self, path: &str) -> Result<XlReader<'_, RS>, XlsxError> {
        xml_reader(&mut self.zip, path).unwrap_or_else(|| Err(XlsxError::FileNotFound(path.into())))
    }

    /// Streams one sheet into `out`.
    ///
    /// Returns the number of lines written and, if the sheet was cut short, the
    /// sheet local error. Errors which must stop the whole run are returned as `Err`.
    pub(crate) fn write_sheet_csv<W: Write>(
        &mut self,
        path: &str,
        out: &mut W,
        options: &ConvertOptions,
    ) -> Result<(usize, Option<XlsxError>), XlsxError> {
        let context = SheetContext {
            strings: SharedStrings::new(&self.strings),
            styles: &self.styles,
            is_1904: self.is_1904,
        };
        let mut xml = match xml_reader(&mut self.zip, path) {
            Some(Ok(xml)) => xml,
            // a damaged entry does not prevent reading the other sheets
            Some(Err(e)) => return Ok((0, Some(e))),
            None => return Ok((0, Some(XlsxError::FileNotFound(path.to_string())))),
        };
        let mut handler = SheetHandler::new(out, context, options);
        match pump(&mut xml, &mut handler) {
            Ok(()) => Ok((handler.rows_written(), None)),
            Err(e) if e.is_sheet_local() => {
                handler.terminate_line()?;
                Ok((handler.rows_written(), Some(e)))
            }
            Err(e) => Err(e),
        }
    }
}

/// Opens a workbook from a file path
pub fn open_workbook<P: AsRef<Path>>(path: P) -> Result<Xlsx<BufReader<File>>, XlsxError> {
    let file = File::open(path)?;
    Xlsx::new(BufReader::new(file))
}

fn xml_reader<'a, RS: Read + Seek>(
    zip: &'a mut ZipArchive<RS>,
    path: &str,
) -> Option<Result<XlReader<'a, RS>, XlsxError>> {
    let actual_path = zip
        .file_names()
        .find(|n| n.eq_ignore_ascii_case(path))?
        .to_owned();
    match zip.by_name(&actual_path) {
        Ok(f) => Some(Ok(configure(XmlReader::from_reader(BufReader::new(f))))),
        Err(ZipError::FileNotFound) => None,
        Err(e) => Some(Err(e.into())),
    }
}

/// Applies the reader configuration used for every package part
pub(crate) fn configure<R: BufRead>(mut reader: XmlReader<R>) -> XmlReader<R> {
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text(false);
    config.check_comments = false;
    config.expand_empty_elements = true;
    reader
}

/// attempts to read either a simple or richtext string
pub(crate) fn read_string<R: BufRead>(
    xml: &mut XmlReader<R>,
    closing: QName,
) -> Result<Option<String>, XlsxError> {
    let mut buf = Vec::with_capacity(1024);
    let mut val_buf = Vec::with_capacity(1024);
    let mut rich_buffer: Option<String> = None;
    let mut is_phonetic_text = false;
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"r" => {
                if rich_buffer.is_none() {
                    // use a buffer since richtext has multiples <r> and <t> for the same cell
                    rich_buffer = Some(String::new());
                }
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"rPh" => {
                is_phonetic_text = true;
            }
            Ok(Event::End(ref e)) if e.name() == closing => {
                return Ok(rich_buffer);
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"rPh" => {
                is_phonetic_text = false;
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" && !is_phonetic_text => {
                val_buf.clear();
                let mut value = String::new();
                loop {
                    match xml.read_event_into(&mut val_buf)? {
                        Event::Text(t) => value.push_str(&t.xml10_content()?),
                        Event::GeneralRef(e) => unescape_entity_to_buffer(&e, &mut value)?,
                        Event::CData(c) => value.push_str(&c.decode()?),
                        Event::End(end) if end.name() == e.name() => break,
                        Event::Eof => return Err(XlsxError::XmlEof("t")),
                        _ => (),
                    }
                    val_buf.clear();
                }
                if let Some(ref mut s) = rich_buffer {
                    s.push_str(&value);
                } else {
                    // consume any remaining events up to expected closing tag
                    xml.read_to_end_into(closing, &mut val_buf)?;
                    return Ok(Some(value));
                }
            }
            Ok(Event::Eof) => return Err(XlsxError::XmlEof("si")),
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => (),
        }
    }
}
