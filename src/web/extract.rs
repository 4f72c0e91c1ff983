//! Request extractors: the logged-in user, the client's address, and
//! `Json`/`Query`/`Path` wrappers whose rejections use the JSON error body

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_cookies::{Cookie, Cookies};
use tracing::debug;

use super::{blocking, AppState};
use crate::models::{ClientInfo, User};
use crate::services::permissions::{require, Permission};
use crate::utils::{AppError, AppResult};

/// The user behind the session cookie, reloaded from the database on every
/// request so role changes and deactivation apply immediately.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl CurrentUser {
    pub fn require(&self, permission: Permission) -> AppResult<()> {
        require(&self.user, permission)
    }

    pub fn id(&self) -> AppResult<i64> {
        self.user.id.ok_or(AppError::Unauthorized)
    }
}

/// Session cookie with the given token
pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.session.secure_cookie)
        .same_site(tower_cookies::cookie::SameSite::Lax)
        .build()
}

/// Cookie that clears the session cookie
pub fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), "")).path("/").build()
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow::anyhow!(msg)))?;

        let token = cookies
            .get(&state.config.session.cookie_name)
            .map(|c| c.value().to_string())
            .ok_or(AppError::Unauthorized)?;

        let session = match state.sessions.validate(&token) {
            Ok(session) => session,
            Err(e) => {
                cookies.remove(removal_cookie(state));
                return Err(e);
            }
        };

        let user_id = session.user_id;
        let db = state.db.clone();
        let user = blocking(move || Ok(db.users().find_by_id(user_id)?)).await?;

        match user {
            Some(user) if user.is_active => Ok(CurrentUser { user, token }),
            _ => {
                debug!("Dropping session of missing or inactive user {}", user_id);
                state.sessions.destroy(&token)?;
                cookies.remove(removal_cookie(state));
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// Address and user agent of the caller, for the login log
pub struct Client(pub ClientInfo);

#[async_trait]
impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Client(ClientInfo {
            ip_address: forwarded.or(peer),
            user_agent,
        }))
    }
}

/// Turn an axum extractor rejection into an API error
fn rejected(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::TooLarge(text)
    } else if status.is_server_error() {
        AppError::Internal(anyhow::anyhow!(text))
    } else {
        AppError::Validation(text)
    }
}

/// JSON request body or response
pub struct Json<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(rejected(rejection.status(), rejection.body_text())),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Query string parameters
pub struct Query<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(Query(value)),
            Err(rejection) => Err(rejected(rejection.status(), rejection.body_text())),
        }
    }
}

/// Path parameters
pub struct Path<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(value)) => Ok(Path(value)),
            Err(rejection) => Err(rejected(rejection.status(), rejection.body_text())),
        }
    }
}
