//! HTTP API: router, shared state and request extractors

pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_cookies::CookieManagerLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::models::AppConfig;
use crate::services::SessionStore;
use crate::utils::{AppError, AppResult};

pub use extract::{Client, CurrentUser};

/// Room for multipart boundaries and form fields around an upload
const BODY_OVERHEAD: usize = 64 * 1024;

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        let sessions = SessionStore::new(config.session.timeout_secs);
        Self {
            db,
            config: Arc::new(config),
            sessions,
        }
    }
}

/// Run database work off the async runtime
pub(crate) async fn blocking<F, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Background task failed: {}", e)))?
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.uploads.max_bytes + BODY_OVERHEAD;

    Router::new()
        .route("/health", get(health_check))
        .merge(handlers::auth::routes())
        .merge(handlers::documents::routes())
        .merge(handlers::attachments::routes())
        .merge(handlers::users::routes())
        .merge(handlers::logs::routes())
        .merge(handlers::admin::routes())
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/import/documents", post(handlers::admin::import_documents))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
