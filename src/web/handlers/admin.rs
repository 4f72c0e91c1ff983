//! Backups, database maintenance, export and import

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::services::export::ExportResult;
use crate::services::maintenance::{BackupResult, IntegrityReport, MaintenanceResult};
use crate::services::{BackupInfo, ExportFormat, ExportService, ImportResult, MaintenanceService};
use crate::utils::{AppError, AppResult};
use crate::web::extract::{Json, Path, Query};
use crate::web::{blocking, AppState, CurrentUser};

/// Log retention used when the request doesn't name one
const DEFAULT_RETENTION_DAYS: u32 = 90;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/backup", post(create_backup))
        .route("/api/admin/backups", get(list_backups))
        .route("/api/admin/backups/:name", delete(delete_backup))
        .route("/api/admin/vacuum", post(vacuum))
        .route("/api/admin/reindex", post(reindex))
        .route("/api/admin/integrity", get(integrity_check))
        .route("/api/admin/purge-logs", post(purge_logs))
        .route("/api/export/documents", get(export_documents))
        .route("/api/export/store", post(write_store))
}

#[derive(Debug, Default, Deserialize)]
pub struct PurgeRequest {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

async fn create_backup(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<(StatusCode, Json<BackupResult>)> {
    let result =
        blocking(move || MaintenanceService::new(&state.db, &state.config).backup(&current.user)).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn list_backups(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<BackupInfo>>> {
    let backups =
        blocking(move || MaintenanceService::new(&state.db, &state.config).list_backups(&current.user))
            .await?;
    Ok(Json(backups))
}

async fn delete_backup(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    blocking(move || {
        MaintenanceService::new(&state.db, &state.config).delete_backup(&name, &current.user)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vacuum(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<MaintenanceResult>> {
    let result =
        blocking(move || MaintenanceService::new(&state.db, &state.config).vacuum(&current.user)).await?;
    Ok(Json(result))
}

async fn reindex(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<MaintenanceResult>> {
    let result =
        blocking(move || MaintenanceService::new(&state.db, &state.config).reindex(&current.user)).await?;
    Ok(Json(result))
}

async fn integrity_check(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Json<IntegrityReport>> {
    let report = blocking(move || {
        MaintenanceService::new(&state.db, &state.config).integrity_check(&current.user)
    })
    .await?;
    Ok(Json(report))
}

async fn purge_logs(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Option<Json<PurgeRequest>>,
) -> AppResult<Json<Value>> {
    let days = request
        .and_then(|Json(r)| r.days)
        .unwrap_or(DEFAULT_RETENTION_DAYS);

    let removed = blocking(move || {
        MaintenanceService::new(&state.db, &state.config).purge_logs(days, &current.user)
    })
    .await?;
    Ok(Json(json!({ "removed": removed, "days": days })))
}

async fn export_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let format = match query.format.as_deref() {
        None => ExportFormat::Json,
        Some(f) => ExportFormat::parse(f)
            .ok_or_else(|| AppError::validation(format!("Unknown export format: {}", f)))?,
    };

    let content = blocking(move || {
        ExportService::new(&state.db, &state.config).export_documents(format, &current.user)
    })
    .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        ExportService::generate_filename(format)
    );
    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

async fn write_store(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<ExportResult>> {
    let result =
        blocking(move || ExportService::new(&state.db, &state.config).write_json_store(&current.user))
            .await?;
    Ok(Json(result))
}

/// Merge posted JSON into the database. An empty body re-reads the store file.
pub async fn import_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    body: String,
) -> AppResult<Json<ImportResult>> {
    let result = blocking(move || {
        let service = ExportService::new(&state.db, &state.config);
        if body.trim().is_empty() {
            service.import_json_store(&current.user)
        } else {
            service.import_json(&body, &current.user)
        }
    })
    .await?;
    Ok(Json(result))
}
