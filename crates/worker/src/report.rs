use anyhow::Context;
use forecastlens_core::domain::batch::BatchResult;
use forecastlens_core::ingest::{IngestSummary, ValidationFailure};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub ingest: IngestSummary,
    pub batches: Vec<BatchResult>,
    pub totals: RunTotals,
}

#[derive(Debug, Default, Serialize)]
pub struct RunTotals {
    pub explained: usize,
    pub failed: usize,
    pub ai_generated: usize,
    pub rule_based: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(ingest: IngestSummary) -> Self {
        Self {
            ingest,
            batches: Vec::new(),
            totals: RunTotals::default(),
        }
    }

    /// `row_indices[i]` is the input row of the batch's i-th record. Failure
    /// indices are rewritten to input rows so they survive chunking and skipped rows.
    pub fn push(&mut self, mut batch: BatchResult, row_indices: &[usize]) {
        let to_row = |i: usize| row_indices.get(i).copied().unwrap_or(i);
        for f in batch
            .failures
            .iter_mut()
            .chain(batch.summary.failed_details.iter_mut())
        {
            f.index = to_row(f.index);
        }

        let s = &batch.summary;
        self.totals.explained += s.successful;
        self.totals.failed += s.failed;
        self.totals.ai_generated += s.ai_generated;
        self.totals.rule_based += s.rule_based;
        self.totals.cancelled |= s.cancelled;

        tracing::info!(
            batch_id = %batch.batch_id,
            successful = s.successful,
            failed = s.failed,
            success_rate = s.success_rate,
            "batch complete"
        );
        self.batches.push(batch);
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut out, self).context("failed to serialize run report")?;
        writeln!(out).context("failed to write run report")?;
        Ok(())
    }

    /// `None` writes to stdout.
    pub fn write(&self, path: Option<&Path>) -> anyhow::Result<()> {
        match path {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                self.write_to(std::io::BufWriter::new(file))?;
                tracing::info!(path = %path.display(), "report written");
                Ok(())
            }
            None => self.write_to(std::io::stdout().lock()),
        }
    }
}

/// Input row numbers of the rows that passed validation, in order.
pub fn valid_row_indices(total_rows: usize, invalid: &[ValidationFailure]) -> Vec<usize> {
    let mut invalid_rows: Vec<usize> = invalid.iter().map(|f| f.row_index).collect();
    invalid_rows.sort_unstable();
    (0..total_rows)
        .filter(|i| invalid_rows.binary_search(i).is_err())
        .collect()
}
