//! File uploads attached to documents

use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::models::DocumentAttachment;
use crate::services::permissions::{has_permission, Permission};
use crate::services::{AttachmentService, WorkflowService};
use crate::utils::{AppError, AppResult};
use crate::web::extract::{Json, Path};
use crate::web::{blocking, AppState, CurrentUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/documents/:id/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route(
            "/api/attachments/:id",
            get(download_attachment).delete(delete_attachment),
        )
}

async fn list_attachments(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(document_id): Path<i64>,
) -> AppResult<Json<Vec<DocumentAttachment>>> {
    let attachments = blocking(move || {
        WorkflowService::new(&state.db, &state.config).get(document_id, &current.user)?;
        AttachmentService::new(&state.db, &state.config).list(document_id)
    })
    .await?;
    Ok(Json(attachments))
}

async fn upload_attachment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(document_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentAttachment>)> {
    current.require(Permission::UploadAttachment)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("Invalid upload: {}", e)))?;
        upload = Some((filename, content_type, bytes));
        break;
    }

    let (filename, content_type, bytes) =
        upload.ok_or_else(|| AppError::validation("No file selected"))?;

    let attachment = blocking(move || {
        WorkflowService::new(&state.db, &state.config).get(document_id, &current.user)?;
        AttachmentService::new(&state.db, &state.config).add(
            document_id,
            &filename,
            content_type.as_deref(),
            &bytes,
            &current.user,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn download_attachment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let (attachment, content) = blocking(move || {
        let service = AttachmentService::new(&state.db, &state.config);
        let attachment = service.find(id)?;
        WorkflowService::new(&state.db, &state.config).get(attachment.document_id, &current.user)?;
        service.read(id)
    })
    .await?;

    let content_type = attachment
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.original_filename.replace(['"', '\\'], "_")
    );

    Ok((
        [(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)],
        content,
    )
        .into_response())
}

async fn delete_attachment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    blocking(move || {
        let service = AttachmentService::new(&state.db, &state.config);
        let attachment = service.find(id)?;
        WorkflowService::new(&state.db, &state.config).get(attachment.document_id, &current.user)?;

        let is_uploader = attachment.uploaded_by.is_some() && attachment.uploaded_by == current.user.id;
        if !is_uploader && !has_permission(current.user.role, Permission::ManageSystem) {
            return Err(AppError::forbidden("Only the uploader can remove this attachment"));
        }

        service.delete(id, &current.user)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
