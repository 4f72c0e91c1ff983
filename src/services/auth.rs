//! Password hashing and login

use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{validate_password, ClientInfo, LoginEvent, User};
use crate::utils::{AppError, AppResult};

/// Outcome of checking a password against a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Invalid,
    Valid,
    /// Matched a plaintext row from an old install; should be rehashed
    ValidLegacy,
}

impl PasswordCheck {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

pub fn is_password_hash(stored: &str) -> bool {
    stored.starts_with("$argon2")
}

pub fn verify_password(password: &str, stored: &str) -> AppResult<PasswordCheck> {
    if !is_password_hash(stored) {
        return Ok(if constant_time_eq(password.as_bytes(), stored.as_bytes()) {
            PasswordCheck::ValidLegacy
        } else {
            PasswordCheck::Invalid
        });
    }

    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(PasswordCheck::Valid),
        Err(argon2::password_hash::Error::Password) => Ok(PasswordCheck::Invalid),
        Err(e) => Err(anyhow!("Password verification failed: {e}").into()),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct AuthService<'a> {
    db: &'a Database,
}

impl<'a> AuthService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Check credentials. Every attempt ends up in the login activity table.
    pub fn login(&self, login: &str, password: &str, client: &ClientInfo) -> AppResult<User> {
        let login = login.trim();
        let users = self.db.users();
        let logs = self.db.logs();

        let Some(user) = users.find_by_login(login)? else {
            logs.record_login(None, login, LoginEvent::Failed, client)?;
            warn!("Failed login for unknown user {}", login);
            return Err(AppError::Unauthorized);
        };

        let check = verify_password(password, &user.password_hash)?;
        if !check.is_valid() || !user.is_active {
            logs.record_login(user.id, &user.username, LoginEvent::Failed, client)?;
            warn!(
                "Failed login for {} ({})",
                user.username,
                if user.is_active { "bad password" } else { "inactive" }
            );
            return Err(AppError::Unauthorized);
        }

        let id = user.id.ok_or_else(|| anyhow!("User has no ID"))?;

        if check == PasswordCheck::ValidLegacy {
            users.set_password(id, &hash_password(password)?)?;
            info!("Upgraded legacy password for {}", user.username);
        }

        users.touch_last_login(id)?;
        logs.record_login(Some(id), &user.username, LoginEvent::Login, client)?;
        info!("{} logged in", user.username);

        Ok(users.find_by_id(id)?.unwrap_or(user))
    }

    pub fn logout(&self, user_id: i64, username: &str, client: &ClientInfo) -> AppResult<()> {
        self.db
            .logs()
            .record_login(Some(user_id), username, LoginEvent::Logout, client)?;
        Ok(())
    }

    /// Change one's own password; the current one must match
    pub fn change_password(&self, user_id: i64, current: &str, new_password: &str) -> AppResult<()> {
        let user = self
            .db
            .users()
            .find_by_id(user_id)?
            .ok_or_else(|| AppError::not_found("User"))?;

        if !verify_password(current, &user.password_hash)?.is_valid() {
            return Err(AppError::validation("Current password is incorrect"));
        }
        validate_password(new_password)?;

        self.db.users().set_password(user_id, &hash_password(new_password)?)?;
        self.db
            .logs()
            .log(&user.username, "password.change", None)?;

        Ok(())
    }
}
