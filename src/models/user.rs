use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::AppError;

/// Role carried by every user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Registry,
    Supervisor,
    #[default]
    User,
}

impl Role {
    /// Parse free text from forms or old rows. Unknown values fall back to `User`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Self::Administrator,
            "registry" => Self::Registry,
            "supervisor" => Self::Supervisor,
            _ => Self::User,
        }
    }

    pub fn all() -> &'static [Role] {
        &[Self::Administrator, Self::Registry, Self::Supervisor, Self::User]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Administrator => write!(f, "Administrator"),
            Self::Registry => write!(f, "Registry"),
            Self::Supervisor => write!(f, "Supervisor"),
            Self::User => write!(f, "User"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub last_login: Option<String>,
}

/// Input for creating a user account
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        Ok(())
    }

    pub fn role(&self) -> Role {
        self.role.as_deref().map(Role::parse).unwrap_or_default()
    }
}

/// Partial update of a user account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AppError::validation("Username must be 3-50 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AppError::validation(
            "Username may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let mut parts = email.trim().split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AppError::validation("Invalid email address")),
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < 8 {
        return Err(AppError::validation("Password must be at least 8 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Administrator"), Role::Administrator);
        assert_eq!(Role::parse(" admin "), Role::Administrator);
        assert_eq!(Role::parse("REGISTRY"), Role::Registry);
        assert_eq!(Role::parse("supervisor"), Role::Supervisor);
        assert_eq!(Role::parse("Clerk"), Role::User);
        assert_eq!(Role::parse(""), Role::User);

        for role in Role::all() {
            assert_eq!(Role::parse(&role.to_string()), *role);
        }
    }

    #[test]
    fn test_new_user_validation() {
        let mut user = NewUser {
            username: "jdoe".into(),
            email: "jdoe@kemri.org".into(),
            phone: None,
            department: Some("Finance".into()),
            password: "secret-pass".into(),
            role: Some("Registry".into()),
        };
        assert!(user.validate().is_ok());
        assert_eq!(user.role(), Role::Registry);

        user.username = "jd".into();
        assert!(user.validate().is_err());

        user.username = "j doe".into();
        assert!(user.validate().is_err());

        user.username = "jdoe".into();
        user.email = "a@b@c".into();
        assert!(user.validate().is_err());

        user.email = "jdoe@kemri.org".into();
        user.password = "short".into();
        assert!(user.validate().is_err());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: Some(1),
            username: "admin".into(),
            email: "admin@kemri.org".into(),
            phone: None,
            department: None,
            password_hash: "$argon2id$secret".into(),
            role: Role::Administrator,
            is_active: true,
            created_at: None,
            last_login: None,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"Administrator\""));
    }
}
