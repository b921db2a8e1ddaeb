use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forecastlens_core::explain::{BatchOptions, BatchOrchestrator, ExplanationGenerator};
use forecastlens_core::ingest;

mod report;

use report::RunReport;

#[derive(Debug, Parser)]
#[command(name = "forecastlens_worker")]
struct Args {
    /// Forecast CSV with one row per SKU/store/date.
    #[arg(long)]
    input: PathBuf,

    /// Validate rows and report, without calling the model.
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = forecastlens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, input = %args.input.display(), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args, settings: &forecastlens_core::config::Settings) -> anyhow::Result<()> {
    let rows = ingest::csv::read_rows_from_path(&args.input)?;
    let ingest_report = ingest::validate_rows(&rows);
    let summary = ingest_report.summary();

    tracing::info!(
        total = summary.total_rows,
        valid = summary.valid_count,
        invalid = summary.invalid_count,
        advisories = summary.advisory_count,
        success_rate = summary.success_rate,
        "ingest validated"
    );
    for failure in &summary.invalid_rows {
        let fields: Vec<&str> = failure.errors.iter().map(|e| e.field.as_str()).collect();
        tracing::warn!(row = failure.row_index, ?fields, "invalid row skipped");
    }

    let mut report = RunReport::new(summary);

    if args.dry_run {
        tracing::info!(dry_run = true, "skipping explanation");
        return report.write(args.output.as_deref());
    }

    let row_indices = report::valid_row_indices(rows.len(), &ingest_report.invalid);
    let records = ingest_report.valid;
    anyhow::ensure!(!records.is_empty(), "no valid rows to explain");

    let generator = Arc::new(ExplanationGenerator::from_settings(settings));
    let orchestrator = BatchOrchestrator::new(generator, BatchOptions::from_env());
    let batch_rows = orchestrator.options().max_batch_rows;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing current sub-batch");
            let _ = cancel_tx.send(true);
        }
    });

    let mut remaining = records.len();
    for (chunk, chunk_rows) in records.chunks(batch_rows).zip(row_indices.chunks(batch_rows)) {
        let mut rx = cancel_rx.clone();
        let cancel = async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                // Signal listener gone; never cancel.
                std::future::pending::<()>().await;
            }
        };

        let result = orchestrator
            .explain_batch_until(chunk.to_vec(), cancel)
            .await
            .context("batch rejected")?;
        remaining -= chunk.len();

        let cancelled = result.summary.cancelled;
        report.push(result, chunk_rows);
        if cancelled {
            tracing::warn!(skipped_rows = remaining, "run cancelled");
            break;
        }
    }

    report.write(args.output.as_deref())
}

fn init_sentry(settings: &forecastlens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
