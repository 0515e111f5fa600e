// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Conversion throughput over generated workbooks.
//!
//! ```bash
//! cargo bench --bench basic
//! ```

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rust_xlsxwriter::{Format, Workbook};
use std::hint::black_box;
use std::io::{self, Cursor};
use std::time::Duration;
use xlsx2csv::{convert, convert_sheet_xml, ConvertOptions, SharedStrings, SheetContext, StyleTable, Xlsx};

const ROWS: u32 = 10_000;

fn generate_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let percent = Format::new().set_num_format("0.00%");
    let currency = Format::new().set_num_format("$#,##0.00");
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    for row in 0..ROWS {
        let value = f64::from(row);
        sheet.write_string(row, 0, format!("item {}", row % 500)).unwrap();
        sheet.write_number(row, 1, value * 1.5).unwrap();
        sheet.write_number_with_format(row, 2, value / ROWS as f64, &percent).unwrap();
        sheet.write_number_with_format(row, 3, value + 0.25, &currency).unwrap();
        sheet.write_number_with_format(row, 4, 45000.0 + value, &date).unwrap();
        sheet.write_boolean(row, 6, row % 2 == 0).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

fn generate_sheet_xml() -> String {
    let mut xml = String::from("<worksheet><sheetData>");
    for row in 1..=ROWS {
        xml.push_str(&format!(
            r#"<row r="{row}"><c r="A{row}" t="s"><v>{}</v></c><c r="C{row}"><v>{row}.5</v></c><c r="D{row}" t="inlineStr"><is><t>text &amp; more</t></is></c></row>"#,
            row % 4
        ));
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn bench_workbook(c: &mut Criterion) {
    let data = generate_workbook();
    let options = ConvertOptions::default();

    let mut group = c.benchmark_group("workbook");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(u64::from(ROWS)));
    group.bench_function("convert", |b| {
        b.iter(|| {
            let mut xlsx = Xlsx::new(Cursor::new(&data)).unwrap();
            let reports = convert(&mut xlsx, &mut io::sink(), &options).unwrap();
            black_box(reports.len())
        })
    });
    group.finish();
}

fn bench_sheet_xml(c: &mut Criterion) {
    let xml = generate_sheet_xml();
    let strings: Vec<String> = ["x", "y", "z", "w"].map(String::from).to_vec();
    let styles = StyleTable::default();
    let context = SheetContext {
        strings: SharedStrings::new(&strings),
        styles: &styles,
        is_1904: false,
    };
    let options = ConvertOptions::default().with_min_columns(Some(8));

    let mut group = c.benchmark_group("sheet_xml");
    group.throughput(Throughput::Bytes(xml.len() as u64));
    group.bench_function("state_machine", |b| {
        b.iter(|| {
            let rows = convert_sheet_xml(xml.as_bytes(), io::sink(), context, &options).unwrap();
            black_box(rows)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_workbook, bench_sheet_xml);
criterion_main!(benches);
