//! Fixtures shared by unit tests

use crate::db::Database;
use crate::models::{Role, User};
use crate::services::auth::hash_password;

pub const TEST_PASSWORD: &str = "password123";

/// Insert an active user with `TEST_PASSWORD`
pub fn create_user(db: &Database, username: &str, role: Role) -> User {
    let mut user = User {
        id: None,
        username: username.into(),
        email: format!("{}@kemri.org", username),
        phone: None,
        department: None,
        password_hash: hash_password(TEST_PASSWORD).unwrap(),
        role,
        is_active: true,
        created_at: None,
        last_login: None,
    };
    db.users().create(&mut user).unwrap();
    user
}
