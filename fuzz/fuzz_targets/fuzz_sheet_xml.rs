#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io;
use xlsx2csv::{
    convert_sheet_xml, CellStyle, ConvertOptions, SharedStrings, SheetContext, StyleTable,
};

fuzz_target!(|data: &[u8]| {
    let strings = vec!["x".to_string(), "y".to_string()];
    let styles = StyleTable::new(vec![
        CellStyle::builtin(0),
        CellStyle::builtin(14),
        CellStyle::builtin(18),
        CellStyle::builtin(22),
        CellStyle::custom(164, "#,##0.00;[Red]-0.0E+00;\"zero\""),
    ]);
    let context = SheetContext {
        strings: SharedStrings::new(&strings),
        styles: &styles,
        is_1904: false,
    };
    let options = ConvertOptions::default().with_min_columns(Some(3));
    let _ = convert_sheet_xml(data, io::sink(), context, &options);
});
