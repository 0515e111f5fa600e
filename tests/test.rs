use std::io::{Cursor, Write};

use rust_xlsxwriter::{Format, Workbook};
use sha2::{Digest, Sha256};
use xlsx2csv::{convert, ConvertOptions, ErrorCellStyle, SheetReport, Xlsx, XlsxError};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two sheets: a small typed table and a 20 rows single column
fn sample_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let percent = Format::new().set_num_format("0%");
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let thousands = Format::new().set_num_format("#,##0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Data").unwrap();
    sheet.write_string(0, 0, "name").unwrap();
    sheet.write_string(0, 1, "share").unwrap();
    sheet.write_string(0, 3, "since").unwrap();
    sheet.write_string(1, 0, "Fish & Chips").unwrap();
    sheet.write_number_with_format(1, 1, 0.5, &percent).unwrap();
    sheet.write_number_with_format(1, 3, 45000.0, &date).unwrap();
    sheet.write_string(2, 0, "say \"hi\"").unwrap();
    sheet.write_number(2, 1, 1.5).unwrap();
    sheet.write_boolean(2, 2, false).unwrap();
    sheet.write_number_with_format(2, 3, 1234.5, &thousands).unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Rows").unwrap();
    for row in 0..20u32 {
        sheet.write_number(row, 1, f64::from(row + 1)).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

fn run(data: &[u8], options: &ConvertOptions) -> (String, Vec<SheetReport>) {
    init_logger();
    let mut xlsx = Xlsx::new(Cursor::new(data)).expect("cannot open workbook");
    let mut out = Vec::new();
    let reports = convert(&mut xlsx, &mut out, options).expect("cannot convert workbook");
    (String::from_utf8(out).unwrap(), reports)
}

#[test]
fn convert_workbook() {
    let (output, reports) = run(&sample_workbook(), &ConvertOptions::default());
    let data = concat!(
        "Data [index=0]:\n",
        "\"name\",\"share\",,\"since\"\n",
        "\"Fish & Chips\",50%,,\"3/15/2023\"\n",
        "\"say \"\"hi\"\"\",1.5,FALSE,\"1,234.50\"\n",
    );
    assert!(output.starts_with(data), "unexpected output:\n{output}");
    assert!(output[data.len()..].starts_with("Rows [index=1]:\n,1\n,2\n"));
    assert!(output.ends_with(",20\n"));

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "Data");
    assert_eq!(reports[0].rows, 3);
    assert_eq!(reports[1].index, 1);
    assert_eq!(reports[1].rows, 20);
    assert!(reports.iter().all(SheetReport::is_complete));
}

#[test]
fn row_filter() {
    let options = ConvertOptions::default()
        .with_first_row(Some(5))
        .with_last_row(Some(13))
        .with_sheet_pattern("Rows")
        .unwrap();
    let (output, reports) = run(&sample_workbook(), &options);
    let expected: String = std::iter::once("Rows [index=1]:\n".to_string())
        .chain((5..=13).map(|r| format!(",{r}\n")))
        .collect();
    assert_eq!(output, expected);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].rows, 9);
}

#[test]
fn row_filter_keeps_headers() {
    let options = ConvertOptions::default().with_first_row(Some(100));
    let (output, reports) = run(&sample_workbook(), &options);
    assert_eq!(output, "Data [index=0]:\nRows [index=1]:\n");
    assert!(reports.iter().all(|r| r.rows == 0 && r.is_complete()));
}

#[test]
fn sheet_pattern_without_match() {
    let options = ConvertOptions::default()
        .with_sheet_pattern("Dat")
        .unwrap();
    let (output, reports) = run(&sample_workbook(), &options);
    assert!(output.is_empty());
    assert!(reports.is_empty());
}

#[test]
fn min_columns() {
    let options = ConvertOptions::default()
        .with_min_columns(Some(6))
        .with_sheet_pattern("Data")
        .unwrap()
        .with_separator(';');
    let (output, _) = run(&sample_workbook(), &options);
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("Data [index=0]:"));
    // padding counts from the last written column
    assert_eq!(lines.next(), Some("\"name\";\"share\";;\"since\";;;"));
    assert_eq!(
        lines.next(),
        Some("\"Fish & Chips\";50%;;\"3/15/2023\";;;")
    );
    // the formatted number is no longer quoted with another separator
    assert_eq!(
        lines.next(),
        Some("\"say \"\"hi\"\"\";1.5;FALSE;1,234.50;;;")
    );
    assert_eq!(lines.next(), None);
}

#[test]
fn idempotent() {
    let data = sample_workbook();
    let digest = |output: &str| Sha256::digest(output.as_bytes());
    let (first, _) = run(&data, &ConvertOptions::default());
    let (second, _) = run(&data, &ConvertOptions::default());
    assert_eq!(digest(&first), digest(&second));
}

fn package(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in parts {
        zip_writer.start_file(*name, options).unwrap();
        zip_writer.write_all(content.as_bytes()).unwrap();
    }
    zip_writer.finish().unwrap().into_inner()
}

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId3" Target="worksheets/sheet3.xml"/>
</Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<workbookPr date1904="1"/>
<sheets>
<sheet name="Broken" sheetId="1" r:id="rId1"/>
<sheet name="Missing" sheetId="2" r:id="rId2"/>
<sheet name="Kinds" sheetId="3" r:id="rId3"/>
</sheets>
</workbook>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet><cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="18"/></cellXfs></styleSheet>"#;

const BROKEN: &str = r#"<worksheet><sheetData>
<row r="1"><c r="A1"><v>1</v></c></row>
<row r="2"><c r="A2"><v>2</v></c><c r="B"><v>3</v></c></row>
<row r="3"><c r="A3"><v>4</v></c></row>
</sheetData></worksheet>"#;

const KINDS: &str = r#"<worksheet><sheetData>
<row r="1">
<c r="A1" t="e"><v>#DIV/0!</v></c>
<c r="B1" t="inlineStr"><is><r><t>in</t></r><r><t>line</t></r></is></c>
<c r="C1" s="1"><v>43022</v></c>
<c r="D1" s="2"><v>0.5</v></c>
<c r="E1" t="s"><v>0</v></c>
</row>
</sheetData></worksheet>"#;

#[test]
fn sheet_errors_do_not_stop_the_run() {
    let data = package(&[
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/styles.xml", STYLES),
        ("xl/worksheets/sheet1.xml", BROKEN),
        ("xl/worksheets/sheet3.xml", KINDS),
    ]);
    let (output, reports) = run(&data, &ConvertOptions::default());
    assert_eq!(
        output,
        concat!(
            "Broken [index=0]:\n",
            "1\n",
            "2\n",
            "Missing [index=1]:\n",
            "Kinds [index=2]:\n",
            "\"ERROR:#DIV/0!\",\"inline\",\"10/15/2021\",\"12:00:00 PM\",\n",
        )
    );

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].rows, 2);
    assert!(matches!(
        &reports[0].error,
        Some(XlsxError::MalformedReference(r)) if r == "B"
    ));
    assert!(matches!(
        &reports[1].error,
        Some(XlsxError::FileNotFound(p)) if p == "xl/worksheets/sheet2.xml"
    ));
    assert!(reports[2].is_complete());
}

#[test]
fn error_cells_as_quoted_text() {
    let data = package(&[
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/worksheets/sheet3.xml", KINDS),
    ]);
    let options = ConvertOptions::default()
        .with_error_style(ErrorCellStyle::Quoted)
        .with_sheet_pattern("Kinds")
        .unwrap();
    let (output, _) = run(&data, &options);
    // without styles every number is raw
    assert_eq!(
        output,
        "Kinds [index=2]:\n\"#DIV/0!\",\"inline\",43022,0.5,\n"
    );
}

#[test]
fn damaged_sheet_entry_does_not_stop_the_run() {
    let mut data = package(&[
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/worksheets/sheet1.xml", BROKEN),
        ("xl/worksheets/sheet3.xml", KINDS),
    ]);
    // break the local header signature of the first sheet entry, its file
    // name follows the 30 bytes fixed header
    let name = b"xl/worksheets/sheet1.xml";
    let pos = data
        .windows(name.len())
        .position(|w| w == name)
        .expect("entry name");
    data[pos - 30] ^= 0xff;

    let (output, reports) = run(&data, &ConvertOptions::default());
    assert_eq!(
        output,
        concat!(
            "Broken [index=0]:\n",
            "Missing [index=1]:\n",
            "Kinds [index=2]:\n",
            "\"ERROR:#DIV/0!\",\"inline\",43022,0.5,\n",
        )
    );
    assert_eq!(reports.len(), 3);
    assert!(matches!(&reports[0].error, Some(XlsxError::Zip(_))));
    assert_eq!(reports[0].rows, 0);
    assert!(reports[2].is_complete());
}
