//! Workbook session files with `Data`, `Metadata` and `Variables` sheets.

use crate::core::features::{FeatureName, FeatureSet};
use crate::core::session::{RecordedSample, Recording, SessionMetadata};
use crate::export::{ExportError, SessionFile};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::collections::BTreeMap;
use std::path::Path;

const DATA_SHEET: &str = "Data";
const METADATA_SHEET: &str = "Metadata";
const VARIABLES_SHEET: &str = "Variables";
const DATA_COLUMNS: [&str; 3] = ["time", "x", "y"];

fn workbook_error(e: XlsxError) -> ExportError {
    ExportError::Workbook(e.to_string())
}

pub fn save(session: &SessionFile, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();

    let data = workbook.add_worksheet();
    data.set_name(DATA_SHEET).map_err(workbook_error)?;
    for (col, name) in DATA_COLUMNS.iter().enumerate() {
        data.write_string(0, col as u16, *name).map_err(workbook_error)?;
    }
    for (i, s) in session.rounded_samples().iter().enumerate() {
        let row = i as u32 + 1;
        data.write_number(row, 0, s.time).map_err(workbook_error)?;
        data.write_number(row, 1, s.x).map_err(workbook_error)?;
        data.write_number(row, 2, s.y).map_err(workbook_error)?;
    }

    let metadata = workbook.add_worksheet();
    metadata.set_name(METADATA_SHEET).map_err(workbook_error)?;
    for (col, (name, value)) in session.metadata().pairs().enumerate() {
        metadata.write_string(0, col as u16, name).map_err(workbook_error)?;
        metadata.write_string(1, col as u16, value).map_err(workbook_error)?;
    }

    let variables = workbook.add_worksheet();
    variables.set_name(VARIABLES_SHEET).map_err(workbook_error)?;
    for (col, name) in FeatureName::ALL.iter().enumerate() {
        variables.write_string(0, col as u16, name.key()).map_err(workbook_error)?;
    }
    if let Some(features) = &session.variables {
        for (col, (_, value)) in features.iter().enumerate() {
            variables.write_number(1, col as u16, value).map_err(workbook_error)?;
        }
    }

    workbook.save(path).map_err(workbook_error)
}

pub fn load(path: &Path) -> Result<SessionFile, ExportError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: calamine::XlsxError| ExportError::Workbook(e.to_string()))?;

    let data = workbook
        .worksheet_range(DATA_SHEET)
        .map_err(|e| ExportError::Workbook(e.to_string()))?;
    let samples = read_data(&data)?;

    let metadata = match workbook.worksheet_range(METADATA_SHEET) {
        Ok(range) => read_metadata(&range),
        Err(_) => SessionMetadata::default(),
    };

    let variables = match workbook.worksheet_range(VARIABLES_SHEET) {
        Ok(range) => read_variables(&range)?,
        Err(_) => None,
    };

    Ok(SessionFile::new(Recording::new(metadata, samples), variables))
}

/// Header row as owned strings.
fn header(range: &Range<Data>) -> Vec<String> {
    range
        .rows()
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default()
}

fn read_data(range: &Range<Data>) -> Result<Vec<RecordedSample>, ExportError> {
    let header = header(range);
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ExportError::Format(format!("Data sheet has no '{name}' column")))
    };
    let (t, x, y) = (column("time")?, column("x")?, column("y")?);

    // Blank or non-numeric cells become NaN so normalization can reject them.
    let value = |row: &[Data], col: usize| row.get(col).and_then(cell_number).unwrap_or(f64::NAN);
    Ok(range
        .rows()
        .skip(1)
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| RecordedSample::new(value(row, t), value(row, x), value(row, y)))
        .collect())
}

fn read_metadata(range: &Range<Data>) -> SessionMetadata {
    let mut metadata = SessionMetadata::default();
    let names = header(range);
    if let Some(values) = range.rows().nth(1) {
        for (name, cell) in names.iter().zip(values) {
            metadata.set(name, cell_text(cell));
        }
    }
    metadata
}

fn read_variables(range: &Range<Data>) -> Result<Option<FeatureSet>, ExportError> {
    let names = header(range);
    let Some(values) = range.rows().nth(1) else {
        return Ok(None);
    };
    let named: BTreeMap<String, f64> = names
        .into_iter()
        .zip(values)
        .filter_map(|(name, cell)| cell_number(cell).map(|v| (name, v)))
        .collect();
    if named.is_empty() {
        return Ok(None);
    }
    FeatureSet::from_named(&named)
        .map(Some)
        .map_err(|e| ExportError::Format(e.to_string()))
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_conversions() {
        assert_eq!(cell_number(&Data::Int(3)), Some(3.0));
        assert_eq!(cell_number(&Data::String(" 1.5 ".to_string())), Some(1.5));
        assert_eq!(cell_number(&Data::Empty), None);
        assert_eq!(cell_text(&Data::Float(172.5)), "172.5");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
