#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::{self, Cursor};
use xlsx2csv::{convert, ConvertOptions, Xlsx};

fuzz_target!(|data: &[u8]| {
    let mut workbook = match Xlsx::new(Cursor::new(data)) {
        Ok(workbook) => workbook,
        Err(_) => return,
    };
    let _ = convert(&mut workbook, &mut io::sink(), &ConvertOptions::default());
});
