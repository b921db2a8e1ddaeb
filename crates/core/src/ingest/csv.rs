use crate::ingest::types::RawRow;
use anyhow::Context;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read CSV text into raw rows keyed by header name. Cells stay strings; typing
/// is the validator's job.
pub fn read_rows<R: Read>(reader: R) -> anyhow::Result<Vec<RawRow>> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("failed to read CSV header")?.clone();
    anyhow::ensure!(!headers.is_empty(), "CSV header must be non-empty");

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV record at data row {idx}"))?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_rows_from_path(path: &Path) -> anyhow::Result<Vec<RawRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;
    read_rows(file)
}
