//! CSV ingestion: uploaded bytes to a [`RawRecordSet`]

use crate::error::{PipelineError, Result};
use crate::types::RawRecordSet;
use csv::ReaderBuilder;
use std::path::Path;
use tracing::debug;

/// Reject uploads that are not CSV files
pub fn ensure_csv_filename(filename: &str) -> Result<()> {
    if filename.to_ascii_lowercase().ends_with(".csv") {
        Ok(())
    } else {
        Err(PipelineError::UnsupportedFileType {
            filename: filename.to_string(),
        })
    }
}

/// Read a stored upload back from disk and parse it
pub fn read_csv_file<P: AsRef<Path>>(path: P) -> Result<RawRecordSet> {
    let path = path.as_ref();
    let content = std::fs::read(path).map_err(|e| PipelineError::UploadStorage {
        reason: format!("{}: {}", path.display(), e),
    })?;
    read_csv(&content)
}

/// Parse CSV content whose first row is the header.
///
/// Fails with [`PipelineError::EmptyInput`] when the content is blank or the
/// header is followed by no data rows. Short rows are padded; a row with more
/// fields than the header is [`PipelineError::MalformedRow`].
pub fn read_csv(content: &[u8]) -> Result<RawRecordSet> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::EmptyInput);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > headers.len() {
            return Err(PipelineError::MalformedRow {
                row: index + 1,
                expected: headers.len(),
                found: record.len(),
            });
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    debug!(columns = headers.len(), rows = rows.len(), "CSV parsed");

    Ok(RawRecordSet::new(headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_csv_filename_check() {
        assert!(ensure_csv_filename("patients.csv").is_ok());
        assert!(ensure_csv_filename("PATIENTS.CSV").is_ok());

        let err = ensure_csv_filename("patients.xlsx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
    }

    #[test]
    fn test_read_csv() {
        let raw = read_csv(b"id,Age,Gender\n1,0.5,Male\n2,0.7,Female\n").unwrap();

        assert_eq!(raw.headers(), ["id", "Age", "Gender"]);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.rows()[1][2], "Female");
    }

    #[test]
    fn test_zero_bytes_is_empty_input() {
        assert_eq!(read_csv(b"").unwrap_err().kind(), ErrorKind::EmptyInput);
        assert_eq!(read_csv(b"  \n").unwrap_err().kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_header_only_is_empty_input() {
        let err = read_csv(b"id,age,gender\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let raw = read_csv(b"id,age,bmi\n1,0.4\n").unwrap();
        assert_eq!(raw.rows()[0], vec!["1", "0.4", ""]);
    }

    #[test]
    fn test_long_row_is_malformed() {
        let err = read_csv(b"id,age,bmi\n1,0.4,0.2\n2,0.5,0.3,999\n").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedRow);
        match err {
            PipelineError::MalformedRow {
                row,
                expected,
                found,
            } => {
                assert_eq!((row, expected, found), (2, 3, 4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.csv");
        std::fs::write(&path, "id,age\n1,0.4\n").unwrap();

        assert_eq!(read_csv_file(&path).unwrap().len(), 1);

        let err = read_csv_file(dir.path().join("gone.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UploadStorage);
    }
}
