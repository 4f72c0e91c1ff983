//! Login, logout and the current session

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use tracing::info;

use crate::services::permissions::permissions_for;
use crate::services::AuthService;
use crate::utils::{AppError, AppResult};
use crate::web::extract::{removal_cookie, session_cookie, Json};
use crate::web::{blocking, AppState, Client, CurrentUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/password", post(change_password))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Client(client): Client,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let db = state.db.clone();
    let user = blocking(move || {
        AuthService::new(&db).login(request.login.trim(), &request.password, &client)
    })
    .await?;

    let user_id = user.id.ok_or(AppError::Unauthorized)?;
    let token = state.sessions.create(user_id, &user.username)?;
    cookies.add(session_cookie(&state, token));

    Ok(Json(json!({
        "user": user,
        "permissions": permissions_for(user.role),
        "session_timeout_secs": state.sessions.timeout_secs(),
    })))
}

async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    Client(client): Client,
    current: CurrentUser,
) -> AppResult<Json<Value>> {
    state.sessions.destroy(&current.token)?;
    cookies.remove(removal_cookie(&state));

    let user_id = current.id()?;
    let username = current.user.username.clone();
    let db = state.db.clone();
    blocking(move || AuthService::new(&db).logout(user_id, &username, &client)).await?;
    info!("{} logged out", current.user.username);

    Ok(Json(json!({ "success": true })))
}

async fn me(State(state): State<AppState>, current: CurrentUser) -> Json<Value> {
    Json(json!({
        "user": current.user,
        "permissions": permissions_for(current.user.role),
        "session_timeout_secs": state.sessions.timeout_secs(),
    }))
}

async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<PasswordChangeRequest>,
) -> AppResult<Json<Value>> {
    let user_id = current.id()?;
    let db = state.db.clone();
    blocking(move || {
        AuthService::new(&db).change_password(user_id, &request.current_password, &request.new_password)
    })
    .await?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::models::{LoginEvent, Role};
    use crate::web::test_app::TestApp;

    #[tokio::test]
    async fn test_login_sets_cookie_and_me_works() {
        let app = TestApp::new();
        app.user("registry1", Role::Registry);

        let cookie = app.login("registry1").await;
        assert!(cookie.starts_with("doctrack_session="));

        let (status, body) = app.request(Method::GET, "/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "registry1");
        assert!(body["user"].get("password_hash").is_none());
        assert!(body["permissions"]
            .as_array()
            .unwrap()
            .contains(&json!("ApproveRegistry")));
    }

    #[tokio::test]
    async fn test_login_by_email() {
        let app = TestApp::new();
        app.user("clerk", Role::User);

        let (status, body) = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": "clerk@kemri.org", "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "clerk");
    }

    #[tokio::test]
    async fn test_bad_password_is_unauthorized_and_logged() {
        let app = TestApp::new();
        app.user("clerk", Role::User);

        let (status, body) = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "login": "clerk", "password": "wrong-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let logins = app.state.db.logs().recent_logins(10, None).unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].event, LoginEvent::Failed);
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let app = TestApp::new();
        app.user("clerk", Role::User);
        let cookie = app.login("clerk").await;

        let (status, _) = app.request(Method::POST, "/auth/logout", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.state.sessions.is_empty());

        let (status, _) = app.request(Method::GET, "/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = TestApp::new();
        app.user("clerk", Role::User);
        let cookie = app.login("clerk").await;

        let (status, _) = app
            .request(
                Method::POST,
                "/auth/password",
                Some(&cookie),
                Some(json!({ "current_password": "nope-nope", "new_password": "brand-new-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .request(
                Method::POST,
                "/auth/password",
                Some(&cookie),
                Some(json!({ "current_password": "password123", "new_password": "brand-new-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "login": "clerk", "password": "brand-new-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}
