//! Planning importer - administrative server for bulk sub-activity imports.

mod access;
mod bulk_import;
mod config;
mod import_row;
mod planning;
mod report;
mod sheet_parser;
mod store;
mod template;
mod upload;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::{AppConfig, PlanningSeed};
use planning::{Organization, SubActivitySummary};
use report::ImportReport;
use store::PlanningStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload::{ImportForm, Upload, FILE_FIELDS};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: PlanningStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "planning_importer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Reference data for row resolution
    let seed = PlanningSeed::load(&config.seed_path)?;
    let store = PlanningStore::from_seed(seed)?;

    let state = AppState { store };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/organizations", get(list_organizations))
        .route("/sub-activities", get(list_sub_activities))
        .route("/sub-activities/import-template", get(download_template))
        .route("/sub-activities/bulk-import", post(bulk_import))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Organizations for the default-organization dropdown.
async fn list_organizations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Organization>>, (StatusCode, String)> {
    access::caller_role(&headers)?;
    Ok(Json(state.store.organizations()))
}

/// Sub-activities with estimated cost, total funding and funding gap.
async fn list_sub_activities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SubActivitySummary>>, (StatusCode, String)> {
    access::caller_role(&headers)?;
    Ok(Json(state.store.sub_activities()))
}

/// Download the CSV import template.
async fn download_template(headers: HeaderMap) -> Result<impl IntoResponse, (StatusCode, String)> {
    access::require_importer(&headers)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, template::content_disposition()),
        ],
        template::template_csv(),
    ))
}

/// Upload a CSV/Excel file and import (or preview) its sub-activities.
async fn bulk_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, (StatusCode, String)> {
    access::require_importer(&headers)?;

    let mut form = ImportForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        if FILE_FIELDS.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or("").to_string();
            let data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;
            // Browsers send an empty part when no file was chosen
            if !filename.is_empty() && !data.is_empty() {
                form.uploads.push(Upload {
                    field: name,
                    filename,
                    data: data.to_vec(),
                });
            }
        } else if name == "organization_id" {
            form.organization_id = Some(field.text().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read organization_id: {}", e))
            })?);
        } else if name == "dry_run" {
            form.dry_run = true;
        } else if name == "skip_duplicates" {
            form.skip_duplicates = true;
        }
    }

    let request = form.into_request()?;

    let store = state.store.clone();
    let report = tokio::task::spawn_blocking(move || request.run(&store, &std::env::temp_dir()))
        .await
        .map_err(|e| upload::internal_error("Import task failed", e))??;

    info!(
        "Import {} finished: {} (store holds {} sub-activities)",
        report.id,
        report.message.lines().next().unwrap_or(""),
        state.store.sub_activity_count()
    );
    Ok(Json(report))
}
