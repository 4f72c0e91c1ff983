use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::models::{LoginActivity, SystemLog};
use crate::services::permissions::{has_permission, Permission};
use crate::utils::AppResult;
use crate::web::extract::{Json, Query};
use crate::web::{blocking, AppState, CurrentUser};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/logs/system", get(system_logs))
        .route("/api/logs/logins", get(login_logs))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub actor: Option<String>,
    pub user_id: Option<i64>,
}

impl LogQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

async fn system_logs(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<SystemLog>>> {
    current.require(Permission::ViewLogs)?;

    let logs = blocking(move || {
        let actor = query.actor.as_deref().map(str::trim).filter(|a| !a.is_empty());
        Ok(state.db.logs().recent_system_logs(query.limit(), actor)?)
    })
    .await?;
    Ok(Json(logs))
}

/// Everyone may see their own logins; the full list needs the log permission
async fn login_logs(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<LoginActivity>>> {
    let user_id = if has_permission(current.user.role, Permission::ViewLogs) {
        query.user_id
    } else {
        Some(current.id()?)
    };

    let logins = blocking(move || Ok(state.db.logs().recent_logins(query.limit(), user_id)?)).await?;
    Ok(Json(logins))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::models::Role;
    use crate::web::test_app::TestApp;

    #[tokio::test]
    async fn test_system_logs_need_permission() {
        let app = TestApp::new();
        app.user("clerk", Role::User);
        app.user("boss", Role::Supervisor);
        let clerk = app.login("clerk").await;
        let boss = app.login("boss").await;
        app.state.db.logs().log("clerk", "document.compose", None).unwrap();
        app.state.db.logs().log("boss", "document.approve", None).unwrap();

        let (status, _) = app.request(Method::GET, "/api/logs/system", Some(&clerk), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, logs) = app
            .request(Method::GET, "/api/logs/system?actor=CLERK&limit=5", Some(&boss), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let logs = logs.as_array().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["action"], "document.compose");
    }

    #[tokio::test]
    async fn test_login_history_is_scoped() {
        let app = TestApp::new();
        app.user("clerk", Role::User);
        app.user("admin", Role::Administrator);
        let clerk = app.login("clerk").await;
        let admin = app.login("admin").await;

        let (status, logins) = app.request(Method::GET, "/api/logs/logins", Some(&clerk), None).await;
        assert_eq!(status, StatusCode::OK);
        let logins = logins.as_array().unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0]["username"], "clerk");

        let (_, logins) = app.request(Method::GET, "/api/logs/logins", Some(&admin), None).await;
        assert_eq!(logins.as_array().unwrap().len(), 2);
    }
}
