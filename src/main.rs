use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, ValueEnum};
use env_logger::Env;
use log::error;

use xlsx2csv::{convert, open_workbook, ConvertOptions, ErrorCellStyle, XlsxError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ErrorStyleArg {
    /// "ERROR:#DIV/0!"
    Wrapped,
    /// "#DIV/0!"
    Quoted,
}

impl From<ErrorStyleArg> for ErrorCellStyle {
    fn from(arg: ErrorStyleArg) -> Self {
        match arg {
            ErrorStyleArg::Wrapped => ErrorCellStyle::Wrapped,
            ErrorStyleArg::Quoted => ErrorCellStyle::Quoted,
        }
    }
}

/// Converts every worksheet of an xlsx file into comma separated text
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Excel 2007+ workbook
    file: PathBuf,

    /// Pad every line up to this many fields
    min_columns: Option<usize>,

    /// First row written (one-based, inclusive)
    #[arg(long)]
    first_row: Option<u32>,

    /// Last row written (one-based, inclusive)
    #[arg(long)]
    last_row: Option<u32>,

    /// Only convert sheets whose whole name matches this regex
    #[arg(long, short = 's')]
    sheet: Option<String>,

    /// Field separator
    #[arg(long, default_value_t = ',')]
    separator: char,

    /// Rendering of error cells
    #[arg(long, value_enum, default_value_t = ErrorStyleArg::Wrapped)]
    error_style: ErrorStyleArg,

    /// Render date styled numbers through their format instead of M/D/YYYY
    #[arg(long)]
    no_date_detection: bool,

    /// Write to this file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> Result<ConvertOptions, XlsxError> {
        let options = ConvertOptions::default()
            .with_min_columns(self.min_columns)
            .with_first_row(self.first_row)
            .with_last_row(self.last_row)
            .with_separator(self.separator)
            .with_error_style(self.error_style.into())
            .with_date_detection(!self.no_date_detection);
        match &self.sheet {
            Some(pattern) => options.with_sheet_pattern(pattern),
            None => Ok(options),
        }
    }
}

/// Diagnostic and usage for an input path which is not a readable file
fn missing_input(file: &Path) -> Option<String> {
    if file.is_file() {
        return None;
    }
    Some(format!(
        "Not found or not a file: {}\n\n{}",
        file.display(),
        Cli::command().render_usage()
    ))
}

fn run(cli: &Cli) -> Result<(), XlsxError> {
    let options = cli.options()?;
    let mut workbook = open_workbook(&cli.file)?;
    let out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).map_err(XlsxError::Output)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(out);
    let reports = convert(&mut workbook, &mut out, &options)?;
    let incomplete = reports.iter().filter(|r| !r.is_complete()).count();
    if incomplete > 0 {
        log::warn!("{incomplete} of {} sheets are incomplete", reports.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Some(message) = missing_input(&cli.file) {
        eprintln!("{message}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_missing_input_shows_usage() {
        let message = missing_input(Path::new("no/such/workbook.xlsx")).unwrap();
        assert!(message.starts_with("Not found or not a file: no/such/workbook.xlsx"));
        assert!(message.contains("Usage:"));
        assert!(message.contains("<FILE>"));

        assert_eq!(missing_input(Path::new(env!("CARGO_MANIFEST_DIR"))).map(|_| ()), Some(()));
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        assert_eq!(missing_input(&manifest), None);
    }

    #[test]
    fn test_options_from_arguments() {
        let cli = Cli::try_parse_from([
            "xlsx2csv",
            "book.xlsx",
            "5",
            "--first-row",
            "2",
            "--sheet",
            "Data",
            "--error-style",
            "quoted",
        ])
        .unwrap();
        let options = cli.options().unwrap();
        assert_eq!(options.min_columns(), Some(5));
        assert!(!options.selection().contains_row(1));
        assert!(options.selection().matches_sheet("Data"));
        assert!(!options.selection().matches_sheet("Data2"));
        assert_eq!(options.classify_policy().error_style, ErrorCellStyle::Quoted);
    }
}
