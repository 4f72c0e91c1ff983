//! DocTrack server entry point

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use doctrack::models::AppConfig;
use doctrack::services::UserService;
use doctrack::{router, AppState, Database};

/// How often expired sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_target(false)
        .init();

    info!("Starting DocTrack v{}", env!("CARGO_PKG_VERSION"));

    config
        .ensure_directories()
        .context("Could not create data directories")?;

    let db = Database::open(&config.storage.database_path)?;
    db.migrate()?;
    info!("Database ready at {:?}", config.storage.database_path);

    let state = AppState::new(db, config);

    if let Some((admin, generated)) =
        UserService::new(&state.db, &state.sessions).bootstrap_admin(&state.config.bootstrap)?
    {
        match generated {
            Some(password) => warn!(
                "Created administrator '{}' with password '{}'. Change it after the first login.",
                admin.username, password
            ),
            None => info!("Created administrator '{}'", admin.username),
        }
    }

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired() {
                Ok(0) => {}
                Ok(n) => info!("Cleared {} expired sessions", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    });

    let address = state.config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Could not bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
