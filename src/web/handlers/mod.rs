pub mod admin;
pub mod attachments;
pub mod auth;
pub mod documents;
pub mod logs;
pub mod users;

use axum::extract::State;

use crate::services::dashboard::{dashboard as dashboard_stats, DashboardStats};
use crate::utils::AppResult;
use crate::web::extract::Json;
use crate::web::{blocking, AppState, CurrentUser};

pub async fn dashboard(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<DashboardStats>> {
    let stats = blocking(move || dashboard_stats(&state.db, &current.user)).await?;
    Ok(Json(stats))
}
