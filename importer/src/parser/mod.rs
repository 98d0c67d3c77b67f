//! Spreadsheet readers: CSV and Excel files to [`Row`]s.
//!
//! - CSV: encoding (chardet) and delimiter are auto-detected; every cell is text.
//! - Excel (`.xlsx`, `.xlsm`, `.xls`, `.ods`): read with calamine; numbers,
//!   booleans and dates keep their native type.
//!
//! Blank lines are skipped. Each row keeps its 1-based position among the data
//! rows, so a report's "row 3" is the third line under the header.

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ReadError, ReadResult};
use crate::models::{RawValue, Row};

/// Where a sheet came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFormat {
    Csv { encoding: String, delimiter: char },
    Excel { sheet: String },
}

/// Rows read from one file, with their data-row numbers.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<(usize, Row)>,
    pub format: SourceFormat,
}

impl Sheet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a CSV or Excel file, chosen by extension.
pub fn read_rows(path: impl AsRef<Path>, sheet: Option<&str>) -> ReadResult<Sheet> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let result = match ext.as_str() {
        "csv" | "txt" | "tsv" => read_csv_bytes(&std::fs::read(path)?),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_excel(path, sheet),
        _ => Err(ReadError::UnsupportedFormat(ext)),
    }?;

    info!(
        path = %path.display(),
        rows = result.rows.len(),
        columns = result.headers.len(),
        "Read input file"
    );
    Ok(result)
}

// =============================================================================
// CSV
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding; unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => {
            let text = String::from_utf8_lossy(bytes);
            text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
        }
    }
}

/// Pick the separator occurring most often in the header line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

/// Read CSV bytes with encoding and delimiter detection.
pub fn read_csv_bytes(bytes: &[u8]) -> ReadResult<Sheet> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    debug!(encoding = %encoding, delimiter = %delimiter.escape_default(), "Detected CSV format");
    read_csv_str(&content, delimiter, encoding)
}

/// Read CSV text with an explicit delimiter.
pub fn read_csv_str(content: &str, delimiter: char, encoding: String) -> ReadResult<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReadError::NoHeaders);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row: Row = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| {
                let cell = record.get(i).unwrap_or("");
                let value = if cell.is_empty() {
                    RawValue::Empty
                } else {
                    RawValue::Text(cell.to_string())
                };
                (header.clone(), value)
            })
            .collect();

        if !row.is_blank() {
            rows.push((idx + 1, row));
        }
    }

    Ok(Sheet {
        headers,
        rows,
        format: SourceFormat::Csv { encoding, delimiter },
    })
}

// =============================================================================
// Excel
// =============================================================================

/// Read one worksheet (the first one unless `sheet` is given).
pub fn read_excel(path: &Path, sheet: Option<&str>) -> ReadResult<Sheet> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ReadError::Excel(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.as_str() == name)
            .cloned()
            .ok_or_else(|| ReadError::SheetNotFound(name.to_string()))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ReadError::Excel("workbook has no worksheets".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReadError::Excel(e.to_string()))?;

    let mut cells = range.rows();
    let header_row = cells.next().ok_or(ReadError::NoHeaders)?;
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string().trim().to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReadError::NoHeaders);
    }

    let mut rows = Vec::new();
    for (idx, data_row) in cells.enumerate() {
        let row: Row = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| {
                let value = data_row.get(i).map(cell_to_raw).unwrap_or(RawValue::Empty);
                (header.clone(), value)
            })
            .collect();

        if !row.is_blank() {
            rows.push((idx + 1, row));
        }
    }

    Ok(Sheet {
        headers,
        rows,
        format: SourceFormat::Excel { sheet: sheet_name },
    })
}

/// Convert a calamine cell, keeping its native type.
pub fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Int(i) => RawValue::Integer(*i),
        Data::Float(f) => RawValue::Float(*f),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            // Serial values below one day carry only a time of day.
            Some(ndt) if dt.as_f64() < 1.0 => RawValue::Time(ndt.time()),
            Some(ndt) => RawValue::DateTime(ndt),
            None => RawValue::Text(cell.to_string()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s),
        other => RawValue::Text(other.to_string()),
    }
}

fn parse_iso_datetime(text: &str) -> RawValue {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return RawValue::DateTime(dt);
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return RawValue::Date(d);
    }
    RawValue::Text(text.to_string())
}
