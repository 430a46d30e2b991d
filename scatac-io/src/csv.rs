//! Delimited-text readers for the count matrix and the label table.
//!
//! Tabs are used for `.tsv` and `.txt` files, commas otherwise; a trailing
//! `.gz` is ignored when choosing. Gzip content is detected by magic bytes.

use std::path::Path;

use ::csv::{ReaderBuilder, StringRecord, Trim};
use log::info;
use scatac_core::compress::open_maybe_gzip;
use scatac_core::{Result, ScatacError};
use scatac_omics::{CountMatrix, SparseMatrix};

/// Field delimiter implied by the file name.
pub fn delimiter_for(path: impl AsRef<Path>) -> u8 {
    let name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".tsv") || name.ends_with(".txt") {
        b'\t'
    } else {
        b','
    }
}

fn reader(path: &Path) -> Result<::csv::Reader<Box<dyn std::io::Read>>> {
    let input = open_maybe_gzip(path)?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter_for(path))
        .trim(Trim::All)
        .from_reader(input))
}

fn parse_err(path: &Path, e: impl std::fmt::Display) -> ScatacError {
    ScatacError::Parse(format!("{}: {e}", path.display()))
}

fn headers(path: &Path, rdr: &mut ::csv::Reader<Box<dyn std::io::Read>>) -> Result<StringRecord> {
    let headers = rdr.headers().map_err(|e| parse_err(path, e))?.clone();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(parse_err(path, "missing header row"));
    }
    Ok(headers)
}

/// Read a peak × cell count table.
///
/// The header row holds the cell ids; its first cell labels the peak-name
/// column and is ignored. Each following row is a peak name and one count
/// per cell. Counts must be whole numbers.
pub fn read_count_matrix(path: impl AsRef<Path>) -> Result<CountMatrix> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let headers = headers(path, &mut rdr)?;
    let cell_ids: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let n_cells = cell_ids.len();

    let mut peak_names = Vec::new();
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for (r, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| parse_err(path, e))?;
        let line = r + 2;
        if record.len() != n_cells + 1 {
            return Err(parse_err(
                path,
                format!("line {line}: {} fields, expected {}", record.len(), n_cells + 1),
            ));
        }
        for (c, field) in record.iter().skip(1).enumerate() {
            let value: f64 = field
                .parse()
                .ok()
                .filter(|v: &f64| v.fract() == 0.0)
                .ok_or_else(|| {
                    parse_err(
                        path,
                        format!("line {line}, cell '{}': '{field}' is not an integer count", cell_ids[c]),
                    )
                })?;
            if value != 0.0 {
                rows.push(r);
                cols.push(c);
                values.push(value);
            }
        }
        peak_names.push(record[0].to_string());
    }

    let matrix = SparseMatrix::from_triplets(rows, cols, values, peak_names.len(), n_cells)?;
    let counts = CountMatrix::new(matrix, peak_names, cell_ids)?;
    info!(
        "read {} peaks \u{00d7} {} cells from {}",
        counts.n_peaks(),
        counts.n_cells(),
        path.display()
    );
    Ok(counts)
}

/// Read one label per row from a table with a header row.
///
/// `column` names the label column; without it the last column is used.
pub fn read_labels(path: impl AsRef<Path>, column: Option<&str>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let headers = headers(path, &mut rdr)?;
    let index = match column {
        Some(name) => headers.iter().position(|h| h == name).ok_or_else(|| {
            ScatacError::InvalidInput(format!(
                "{}: no column '{name}' (have: {})",
                path.display(),
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })?,
        None => headers.len() - 1,
    };

    let mut labels = Vec::new();
    for (r, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| parse_err(path, e))?;
        let label = record
            .get(index)
            .ok_or_else(|| parse_err(path, format!("line {}: missing label field", r + 2)))?;
        labels.push(label.to_string());
    }
    info!(
        "read {} labels from column '{}' of {}",
        labels.len(),
        &headers[index],
        path.display()
    );
    Ok(labels)
}
