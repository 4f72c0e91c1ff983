use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{lock, SharedConnection};
use crate::models::{Role, User};

const USER_COLUMNS: &str =
    "id, username, email, phone, department, password_hash, role, is_active, created_at, last_login";

pub struct UserRepository {
    conn: SharedConnection,
}

impl UserRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// All users, administrators first
    pub fn find_all(&self) -> Result<Vec<User>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users
             ORDER BY CASE role WHEN 'Administrator' THEN 0 ELSE 1 END, username",
            USER_COLUMNS
        ))?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(users)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = lock(&self.conn)?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                [id],
                Self::row_to_user,
            )
            .optional()?;

        Ok(user)
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = lock(&self.conn)?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                [username.trim()],
                Self::row_to_user,
            )
            .optional()?;

        Ok(user)
    }

    /// Look up by username or email (both case-insensitive)
    pub fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = lock(&self.conn)?;
        let login = login.trim();
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE username = ?1 OR email = ?1 ORDER BY id LIMIT 1",
                    USER_COLUMNS
                ),
                [login],
                Self::row_to_user,
            )
            .optional()?;

        Ok(user)
    }

    pub fn email_taken(&self, email: &str, except_id: Option<i64>) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id != ?2)",
            params![email.trim(), except_id.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    pub fn create(&self, user: &mut User) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO users (username, email, phone, department, password_hash, role, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.username.trim(),
                user.email.trim(),
                user.phone,
                user.department,
                user.password_hash,
                user.role.to_string(),
                user.is_active,
            ],
        )?;

        let id = conn.last_insert_rowid();
        user.id = Some(id);

        Ok(id)
    }

    /// Update profile fields, role and active flag
    pub fn update_tx(conn: &Connection, user: &User) -> Result<()> {
        let id = user.id.ok_or_else(|| anyhow!("User has no ID"))?;
        conn.execute(
            "UPDATE users SET email = ?1, phone = ?2, department = ?3, role = ?4, is_active = ?5
             WHERE id = ?6",
            params![
                user.email.trim(),
                user.phone,
                user.department,
                user.role.to_string(),
                user.is_active,
                id,
            ],
        )?;

        Ok(())
    }

    pub fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        Ok(())
    }

    pub fn set_active_tx(conn: &Connection, id: i64, active: bool) -> Result<()> {
        conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(())
    }

    pub fn set_role_tx(conn: &Connection, id: i64, role: Role) -> Result<()> {
        conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.to_string(), id],
        )?;
        Ok(())
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "UPDATE users SET last_login = datetime('now') WHERE id = ?",
            [id],
        )?;
        Ok(())
    }

    pub fn delete_tx(conn: &Connection, id: i64) -> Result<bool> {
        let rows = conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_active(&self) -> Result<i64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Active administrators, optionally ignoring one user
    pub fn count_active_admins(&self, excluding: Option<i64>) -> Result<i64> {
        let conn = lock(&self.conn)?;
        Self::count_active_admins_tx(&conn, excluding)
    }

    pub fn count_active_admins_tx(conn: &Connection, excluding: Option<i64>) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users
             WHERE role = 'Administrator' AND is_active = 1 AND id != ?",
            [excluding.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        let role: String = row.get(6)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            department: row.get(4)?,
            password_hash: row.get(5)?,
            role: Role::parse(&role),
            is_active: row.get(7)?,
            created_at: row.get(8)?,
            last_login: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn sample_user(username: &str, role: Role) -> User {
        User {
            id: None,
            username: username.into(),
            email: format!("{}@kemri.org", username),
            phone: None,
            department: Some("Registry".into()),
            password_hash: "hash".into(),
            role,
            is_active: true,
            created_at: None,
            last_login: None,
        }
    }

    #[test]
    fn test_create_and_find() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.users();

        let mut user = sample_user("jdoe", Role::Registry);
        let id = repo.create(&mut user).unwrap();
        assert!(id > 0);

        let found = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.username, "jdoe");
        assert_eq!(found.role, Role::Registry);
        assert!(found.is_active);
        assert!(found.created_at.is_some());

        assert!(repo.find_by_login("JDOE").unwrap().is_some());
        assert!(repo.find_by_login("jdoe@kemri.org").unwrap().is_some());
        assert!(repo.find_by_login("nobody").unwrap().is_none());
    }

    #[test]
    fn test_username_is_unique_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.users();

        repo.create(&mut sample_user("jdoe", Role::User)).unwrap();
        let mut dup = sample_user("JDoe", Role::User);
        dup.email = "other@kemri.org".into();
        assert!(repo.create(&mut dup).is_err());
    }

    #[test]
    fn test_count_active_admins() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.users();

        let a = repo.create(&mut sample_user("admin1", Role::Administrator)).unwrap();
        let b = repo.create(&mut sample_user("admin2", Role::Administrator)).unwrap();
        repo.create(&mut sample_user("clerk", Role::User)).unwrap();

        assert_eq!(repo.count_active_admins(None).unwrap(), 2);
        assert_eq!(repo.count_active_admins(Some(a)).unwrap(), 1);

        db.transaction(|conn| UserRepository::set_active_tx(conn, b, false)).unwrap();
        assert_eq!(repo.count_active_admins(None).unwrap(), 1);
        assert_eq!(repo.count_active_admins(Some(a)).unwrap(), 0);
        assert_eq!(repo.count_active().unwrap(), 2);

        db.transaction(|conn| UserRepository::set_role_tx(conn, b, Role::Registry)).unwrap();
        let demoted = repo.find_by_id(b).unwrap().unwrap();
        assert_eq!(demoted.role, Role::Registry);
        assert!(!demoted.is_active);
    }
}
