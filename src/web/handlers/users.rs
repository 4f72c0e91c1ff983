//! User administration

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{NewUser, Role, User, UserUpdate};
use crate::services::permissions::Permission;
use crate::services::UserService;
use crate::utils::AppResult;
use crate::web::extract::{Json, Path};
use crate::web::{blocking, AppState, CurrentUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/api/users/:id/password", post(reset_password))
        .route("/api/users/:id/active", put(set_active))
        .route("/api/users/:id/role", put(change_role))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

async fn list_users(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<User>>> {
    let users = blocking(move || UserService::new(&state.db, &state.sessions).list(&current.user)).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = blocking(move || UserService::new(&state.db, &state.sessions).create(&input, &current.user)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    if current.user.id != Some(id) {
        current.require(Permission::ManageUsers)?;
    }
    let user = blocking(move || UserService::new(&state.db, &state.sessions).get(id)).await?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> AppResult<Json<User>> {
    let user = blocking(move || {
        UserService::new(&state.db, &state.sessions).update(id, &update, &current.user)
    })
    .await?;
    Ok(Json(user))
}

async fn set_active(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<ActiveRequest>,
) -> AppResult<Json<User>> {
    let user = blocking(move || {
        UserService::new(&state.db, &state.sessions).set_active(id, request.active, &current.user)
    })
    .await?;
    Ok(Json(user))
}

async fn change_role(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<RoleRequest>,
) -> AppResult<Json<User>> {
    let role = Role::parse(&request.role);
    let user = blocking(move || {
        UserService::new(&state.db, &state.sessions).change_role(id, role, &current.user)
    })
    .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    blocking(move || UserService::new(&state.db, &state.sessions).delete(id, &current.user)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<PasswordResetRequest>,
) -> AppResult<Json<Value>> {
    blocking(move || {
        UserService::new(&state.db, &state.sessions).reset_password(id, &request.new_password, &current.user)
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}
