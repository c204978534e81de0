//! Tabular file parsing for CSV and Excel (.xlsx/.xls) uploads.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::{Path, PathBuf};

/// Extensions accepted by [`parse_file`].
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// Failures that make the whole file unusable.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file type: .{0}. Supported: .csv, .xlsx, .xls")]
    UnsupportedExtension(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to open Excel workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook has no worksheets")]
    EmptyWorkbook,

    #[error("File has no header row")]
    MissingHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Csv,
    Excel,
}

/// One data line with its 1-based line number in the source (header is line 1).
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub line: usize,
    pub values: Vec<String>,
}

/// Header and data rows of one sheet, as strings.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
    pub source_type: SourceType,
}

/// Lowercased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Whether a file name has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(filename: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(Path::new(filename)).as_str())
}

/// Dispatch file parsing by extension.
pub fn parse_file(path: &Path) -> Result<RawSheet, SheetError> {
    let ext = extension_of(path);
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(SheetError::UnsupportedExtension(ext));
    }
    if !path.is_file() {
        return Err(SheetError::NotFound(path.to_path_buf()));
    }

    match ext.as_str() {
        "csv" => parse_csv(path),
        _ => parse_excel(path),
    }
}

fn parse_csv(path: &Path) -> Result<RawSheet, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SheetError::MissingHeader);
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let values: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(RawRecord { line, values });
    }

    Ok(RawSheet {
        name: sheet_name(path),
        headers,
        rows,
        source_type: SourceType::Csv,
    })
}

/// Read the first worksheet of an xlsx/xls workbook. First row = headers.
fn parse_excel(path: &Path) -> Result<RawSheet, SheetError> {
    let mut workbook = open_workbook_auto(path)?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(SheetError::EmptyWorkbook)?;
    let range = workbook.worksheet_range(&name)?;

    // Absolute row index of the first used row, so line numbers match the sheet.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut row_iter = range.rows();

    let headers: Vec<String> = row_iter
        .next()
        .ok_or(SheetError::MissingHeader)?
        .iter()
        .map(|c| clean_header(&cell_to_string(c)))
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SheetError::MissingHeader);
    }

    let mut rows = Vec::new();
    for (idx, row) in row_iter.enumerate() {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        // Skip completely empty rows
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(RawRecord {
            line: first_row + idx + 2,
            values,
        });
    }

    tracing::debug!("Read {} rows from worksheet '{}'", rows.len(), name);

    Ok(RawSheet {
        name,
        headers,
        rows,
        source_type: SourceType::Excel,
    })
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn sheet_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sheet")
        .to_string()
}

/// Convert a calamine cell to a string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}
