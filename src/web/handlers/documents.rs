//! Document search, composition, editing and workflow transitions

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;

use crate::models::{Document, DocumentAction, DocumentComment, DocumentFilter, DocumentUpdate, NewDocument};
use crate::services::{TransitionRequest, WorkflowService};
use crate::utils::AppResult;
use crate::web::extract::{Json, Path, Query};
use crate::web::{blocking, AppState, CurrentUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(compose_document))
        .route("/api/documents/code/:code", get(get_by_code))
        .route("/api/documents/:id", get(get_document).put(update_document))
        .route("/api/documents/:id/transition", post(transition_document))
        .route("/api/documents/:id/history", get(document_history))
        .route("/api/documents/:id/comments", get(list_comments).post(add_comment))
        .route("/api/comments/:id", delete(delete_comment))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

async fn list_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<DocumentFilter>,
) -> AppResult<Json<Vec<Document>>> {
    let docs = blocking(move || {
        WorkflowService::new(&state.db, &state.config).search(&filter, &current.user)
    })
    .await?;
    Ok(Json(docs))
}

async fn compose_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<NewDocument>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let doc = blocking(move || {
        WorkflowService::new(&state.db, &state.config).compose(&input, &current.user)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn get_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Document>> {
    let doc = blocking(move || WorkflowService::new(&state.db, &state.config).get(id, &current.user)).await?;
    Ok(Json(doc))
}

async fn get_by_code(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> AppResult<Json<Document>> {
    let doc = blocking(move || {
        WorkflowService::new(&state.db, &state.config).get_by_code(&code, &current.user)
    })
    .await?;
    Ok(Json(doc))
}

async fn update_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<DocumentUpdate>,
) -> AppResult<Json<Document>> {
    let doc = blocking(move || {
        WorkflowService::new(&state.db, &state.config).update_details(id, &update, &current.user)
    })
    .await?;
    Ok(Json(doc))
}

async fn transition_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<TransitionRequest>,
) -> AppResult<Json<Document>> {
    let doc = blocking(move || {
        WorkflowService::new(&state.db, &state.config).transition(id, &request, &current.user)
    })
    .await?;
    Ok(Json(doc))
}

async fn document_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<DocumentAction>>> {
    let history = blocking(move || {
        WorkflowService::new(&state.db, &state.config).history(id, &current.user)
    })
    .await?;
    Ok(Json(history))
}

async fn list_comments(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<DocumentComment>>> {
    let comments = blocking(move || {
        WorkflowService::new(&state.db, &state.config).comments(id, &current.user)
    })
    .await?;
    Ok(Json(comments))
}

async fn add_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<DocumentComment>)> {
    let comment = blocking(move || {
        WorkflowService::new(&state.db, &state.config).add_comment(id, &request.body, &current.user)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    blocking(move || WorkflowService::new(&state.db, &state.config).delete_comment(id, &current.user))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
