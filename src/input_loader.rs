use std::fmt;
use std::fs::File;
use std::path::Path;
use log::{info, error, warn};
use serde::Deserialize;
use calamine::{Reader, open_workbook_auto};

use crate::error::ScrapeError;

/// Registration number as issued by the regulator, kept exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationNumber(String);

impl RegistrationNumber {
    pub fn new(value: impl Into<String>) -> Self {
        RegistrationNumber(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const CSV_COLUMN_NAMES: [&str; 3] = ["registration_number", "Registration Number", "registration number"];

#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(rename = "registration_number", alias = "Registration Number", alias = "registration number")]
    registration_number: String,
}

/// Read registration numbers in file order. Blank values are skipped; an
/// empty result is not an error here, the caller decides.
pub fn load_registrations<P: AsRef<Path>>(filename: P) -> Result<Vec<RegistrationNumber>, ScrapeError> {
    let path_ref = filename.as_ref();

    if !path_ref.exists() {
        return Err(unreadable(path_ref, "file does not exist"));
    }

    let is_excel = path_ref
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"));

    if is_excel {
        return load_excel(path_ref);
    }

    load_csv(path_ref)
}

fn load_csv(path: &Path) -> Result<Vec<RegistrationNumber>, ScrapeError> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let has_column = rdr
        .headers()
        .map_err(|e| unreadable(path, e))?
        .iter()
        .any(|h| CSV_COLUMN_NAMES.contains(&h));
    if !has_column {
        return Err(unreadable(path, "missing 'registration_number' column"));
    }

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize::<InputRecord>().enumerate() {
        match result {
            Ok(record) => push_value(&mut records, record.registration_number),
            Err(e) => {
                error!("Skipping input row {}: {}", line + 2, e);
            }
        }
    }
    info!("Loaded {} registration numbers from CSV {:?}", records.len(), path);
    Ok(records)
}

fn load_excel(path: &Path) -> Result<Vec<RegistrationNumber>, ScrapeError> {
    let mut excel = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;

    let worksheets = excel.worksheets();
    let Some((_name, range)) = worksheets.first() else {
        return Err(unreadable(path, "workbook has no sheets"));
    };

    let mut records = Vec::new();
    let mut column = None;

    for (row_idx, row) in range.rows().enumerate() {
        if row_idx == 0 {
            column = row.iter().position(|cell| is_registration_header(&cell.to_string()));
            if column.is_none() {
                return Err(unreadable(path, "header row has no registration column"));
            }
            continue;
        }

        match column.and_then(|i| row.get(i)) {
            Some(cell) => push_value(&mut records, cell.to_string()),
            None => warn!("Skipping short Excel row {}", row_idx + 1),
        }
    }

    info!("Loaded {} registration numbers from Excel {:?}", records.len(), path);
    Ok(records)
}

// Whitespace-only values count as blank; anything else is kept untouched.
fn push_value(records: &mut Vec<RegistrationNumber>, raw: String) {
    if !raw.trim().is_empty() {
        records.push(RegistrationNumber::new(raw));
    }
}

fn is_registration_header(header: &str) -> bool {
    header.trim().to_lowercase().replace(['_', ' '], "") == "registrationnumber"
}

fn unreadable(path: &Path, reason: impl ToString) -> ScrapeError {
    ScrapeError::InputUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
