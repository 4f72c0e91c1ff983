//! Server-side login sessions keyed by an opaque cookie token

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{NaiveDateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::permissions::session_expired;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    timeout_secs: u64,
}

impl SessionStore {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout_secs,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Start a session and return its token
    pub fn create(&self, user_id: i64, username: &str) -> AppResult<String> {
        self.create_at(user_id, username, Utc::now().naive_utc())
    }

    pub fn create_at(&self, user_id: i64, username: &str, now: NaiveDateTime) -> AppResult<String> {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            token: token.clone(),
            user_id,
            username: username.to_string(),
            created_at: now,
            last_activity: now,
        };

        self.write()?.insert(token.clone(), session);
        debug!("Session created for {}", username);

        Ok(token)
    }

    pub fn validate(&self, token: &str) -> AppResult<Session> {
        self.validate_at(token, Utc::now().naive_utc())
    }

    /// Look up a session. Expired sessions are removed; live ones are touched.
    pub fn validate_at(&self, token: &str, now: NaiveDateTime) -> AppResult<Session> {
        let mut sessions = self.write()?;

        let session = sessions.get_mut(token).ok_or(AppError::Unauthorized)?;

        if session_expired(session.last_activity, now, self.timeout_secs) {
            let username = session.username.clone();
            sessions.remove(token);
            debug!("Session for {} expired", username);
            return Err(AppError::SessionExpired);
        }

        session.last_activity = now;
        Ok(session.clone())
    }

    pub fn destroy(&self, token: &str) -> AppResult<Option<Session>> {
        Ok(self.write()?.remove(token))
    }

    /// Drop every session belonging to a user. Returns how many were removed.
    pub fn destroy_user(&self, user_id: i64) -> AppResult<usize> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - sessions.len())
    }

    pub fn purge_expired(&self) -> AppResult<usize> {
        self.purge_expired_at(Utc::now().naive_utc())
    }

    pub fn purge_expired_at(&self, now: NaiveDateTime) -> AppResult<usize> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        let timeout = self.timeout_secs;
        sessions.retain(|_, s| !session_expired(s.last_activity, now, timeout));
        Ok(before - sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .write()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Session store lock poisoned")))
    }
}
