use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forecastlens_core::domain::batch::{BatchCapacityError, BatchResult};
use forecastlens_core::domain::explanation::Explanation;
use forecastlens_core::explain::{
    BatchOptions, BatchOrchestrator, ExplanationGenerator, ScenarioOverrides,
};
use forecastlens_core::ingest::{self, IngestSummary, RawRow};
use forecastlens_core::llm::Provider;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);

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

    let generator = Arc::new(ExplanationGenerator::from_settings(&settings));
    let orchestrator = Arc::new(BatchOrchestrator::new(
        generator.clone(),
        BatchOptions::from_env(),
    ));

    let provider = generator.provider();
    let state = AppState {
        generator,
        orchestrator,
        news_configured: settings.newsapi_key.is_some(),
        trends_configured: settings.trends_provider_base_url.is_some(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/api/ingest/validate", post(validate_rows))
        .route("/api/ingest/csv", post(validate_csv))
        .route("/api/explain/single", post(explain_single))
        .route("/api/explain/batch", post(explain_batch))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, ?provider, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    generator: Arc<ExplanationGenerator>,
    orchestrator: Arc<BatchOrchestrator>,
    news_configured: bool,
    trends_configured: bool,
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    service: &'static str,
    version: &'static str,
    generation: Provider,
    news_configured: bool,
    trends_configured: bool,
    max_batch_rows: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        service: "forecastlens",
        version: env!("CARGO_PKG_VERSION"),
        generation: state.generator.provider(),
        news_configured: state.news_configured,
        trends_configured: state.trends_configured,
        max_batch_rows: state.orchestrator.options().max_batch_rows,
    })
}

async fn validate_rows(Json(rows): Json<Vec<RawRow>>) -> Json<IngestSummary> {
    let report = ingest::validate_rows(&rows);
    Json(report.summary())
}

async fn validate_csv(body: String) -> Result<Json<IngestSummary>, ApiError> {
    let rows = ingest::csv::read_rows(body.as_bytes()).map_err(|e| {
        tracing::info!(error = %e, "rejected malformed CSV upload");
        error_body(StatusCode::BAD_REQUEST, format!("{e:#}"))
    })?;

    let report = ingest::validate_rows(&rows);
    tracing::info!(
        total = report.total_rows(),
        invalid = report.invalid.len(),
        "csv upload validated"
    );
    Ok(Json(report.summary()))
}

async fn explain_single(
    State(state): State<AppState>,
    Query(overrides): Query<ScenarioOverrides>,
    Json(row): Json<RawRow>,
) -> Result<Json<Explanation>, ApiError> {
    overrides
        .validate()
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?;

    let validated = ingest::validate_row(0, &row).map_err(|failure| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "invalid forecast row", "failure": failure })),
        )
    })?;

    let explanation = state
        .generator
        .explain_with(&validated.record, &overrides)
        .await;
    Ok(Json(explanation))
}

async fn explain_batch(
    State(state): State<AppState>,
    Json(rows): Json<Vec<RawRow>>,
) -> Result<Json<BatchResult>, ApiError> {
    state
        .orchestrator
        .check_capacity(rows.len())
        .map_err(capacity_error)?;

    let report = ingest::validate_rows(&rows);
    if !report.invalid.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("{} of {} rows failed validation", report.invalid.len(), rows.len()),
                "invalid_rows": report.invalid,
            })),
        ));
    }

    let result = state
        .orchestrator
        .explain_batch(report.valid)
        .await
        .map_err(capacity_error)?;
    Ok(Json(result))
}

fn capacity_error(err: BatchCapacityError) -> ApiError {
    let status = match err {
        BatchCapacityError::Empty => StatusCode::BAD_REQUEST,
        BatchCapacityError::TooMany { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    };
    tracing::info!(error = %err, "batch rejected");
    error_body(status, err.to_string())
}

fn error_body(status: StatusCode, message: String) -> ApiError {
    (status, Json(json!({ "error": message })))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
