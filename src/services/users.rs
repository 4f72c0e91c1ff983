//! User administration
//!
//! All changes go through here so that the system is never left without an
//! active administrator.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;
use tracing::{info, warn};

use super::auth::hash_password;
use super::permissions::{require, Permission};
use super::sessions::SessionStore;
use crate::db::{Database, LogRepository, UserRepository};
use crate::models::{
    validate_email, validate_password, BootstrapConfig, NewUser, Role, User, UserUpdate,
};
use crate::utils::{AppError, AppResult};

pub struct UserService<'a> {
    db: &'a Database,
    sessions: &'a SessionStore,
}

impl<'a> UserService<'a> {
    pub fn new(db: &'a Database, sessions: &'a SessionStore) -> Self {
        Self { db, sessions }
    }

    pub fn list(&self, actor: &User) -> AppResult<Vec<User>> {
        require(actor, Permission::ManageUsers)?;
        Ok(self.db.users().find_all()?)
    }

    pub fn get(&self, id: i64) -> AppResult<User> {
        self.db
            .users()
            .find_by_id(id)?
            .ok_or_else(|| AppError::not_found(format!("User {}", id)))
    }

    pub fn create(&self, input: &NewUser, actor: &User) -> AppResult<User> {
        require(actor, Permission::ManageUsers)?;
        let user = self.insert(input)?;

        self.db.logs().log(
            &actor.username,
            "user.create",
            Some(&format!("{} ({})", user.username, user.role)),
        )?;
        info!("{} created user {}", actor.username, user.username);

        Ok(user)
    }

    fn insert(&self, input: &NewUser) -> AppResult<User> {
        input.validate()?;

        let users = self.db.users();
        if users.find_by_username(&input.username)?.is_some() {
            return Err(AppError::already_exists(format!("Username {}", input.username.trim())));
        }
        if users.email_taken(&input.email, None)? {
            return Err(AppError::already_exists(format!("Email {}", input.email.trim())));
        }

        let mut user = User {
            id: None,
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone.clone().filter(|p| !p.trim().is_empty()),
            department: input.department.clone().filter(|d| !d.trim().is_empty()),
            password_hash: hash_password(&input.password)?,
            role: input.role(),
            is_active: true,
            created_at: None,
            last_login: None,
        };

        if let Err(e) = users.create(&mut user) {
            let err = AppError::from(e);
            return Err(if err.is_constraint_violation() {
                AppError::already_exists(format!("User {}", user.username))
            } else {
                err
            });
        }

        let id = user.id.ok_or_else(|| anyhow::anyhow!("User has no ID"))?;
        self.get(id)
    }

    /// Apply a partial update. Role and active changes go through the
    /// last-administrator check.
    pub fn update(&self, id: i64, update: &UserUpdate, actor: &User) -> AppResult<User> {
        require(actor, Permission::ManageUsers)?;
        let mut user = self.get(id)?;

        if let Some(email) = &update.email {
            validate_email(email)?;
            if self.db.users().email_taken(email, Some(id))? {
                return Err(AppError::already_exists(format!("Email {}", email.trim())));
            }
            user.email = email.trim().to_string();
        }
        if let Some(phone) = &update.phone {
            user.phone = Some(phone.trim().to_string()).filter(|p| !p.is_empty());
        }
        if let Some(department) = &update.department {
            user.department = Some(department.trim().to_string()).filter(|d| !d.is_empty());
        }

        let new_role = update.role.as_deref().map(Role::parse).unwrap_or(user.role);
        let new_active = update.is_active.unwrap_or(user.is_active);
        let deactivated = user.is_active && !new_active;

        self.db.transaction(|conn| -> AppResult<()> {
            ensure_admin_remains(conn, &user, new_role, new_active)?;
            user.role = new_role;
            user.is_active = new_active;
            UserRepository::update_tx(conn, &user)?;
            LogRepository::log_tx(conn, &actor.username, "user.update", Some(&user.username))?;
            Ok(())
        })?;

        if deactivated {
            self.sessions.destroy_user(id)?;
        }

        self.get(id)
    }

    /// Activate or deactivate an account. Deactivation ends its sessions.
    pub fn set_active(&self, id: i64, active: bool, actor: &User) -> AppResult<User> {
        require(actor, Permission::ManageUsers)?;
        let user = self.get(id)?;
        let action = if active { "user.activate" } else { "user.deactivate" };

        self.db.transaction(|conn| -> AppResult<()> {
            ensure_admin_remains(conn, &user, user.role, active)?;
            UserRepository::set_active_tx(conn, id, active)?;
            LogRepository::log_tx(conn, &actor.username, action, Some(&user.username))?;
            Ok(())
        })?;

        if !active {
            self.sessions.destroy_user(id)?;
        }
        info!("{}: {} by {}", action, user.username, actor.username);

        self.get(id)
    }

    pub fn change_role(&self, id: i64, role: Role, actor: &User) -> AppResult<User> {
        require(actor, Permission::ManageUsers)?;
        let user = self.get(id)?;

        self.db.transaction(|conn| -> AppResult<()> {
            ensure_admin_remains(conn, &user, role, user.is_active)?;
            UserRepository::set_role_tx(conn, id, role)?;
            LogRepository::log_tx(
                conn,
                &actor.username,
                "user.role",
                Some(&format!("{}: {} -> {}", user.username, user.role, role)),
            )?;
            Ok(())
        })?;
        info!("{} changed role of {} to {}", actor.username, user.username, role);

        self.get(id)
    }

    pub fn delete(&self, id: i64, actor: &User) -> AppResult<()> {
        require(actor, Permission::ManageUsers)?;
        let user = self.get(id)?;

        if actor.id == Some(id) {
            return Err(AppError::validation("You cannot delete your own account"));
        }
        self.db.transaction(|conn| -> AppResult<()> {
            ensure_admin_remains(conn, &user, Role::User, false)?;
            UserRepository::delete_tx(conn, id)?;
            LogRepository::log_tx(conn, &actor.username, "user.delete", Some(&user.username))?;
            Ok(())
        })?;
        self.sessions.destroy_user(id)?;
        info!("{} deleted user {}", actor.username, user.username);

        Ok(())
    }

    /// Set a new password for someone else and end their sessions
    pub fn reset_password(&self, id: i64, new_password: &str, actor: &User) -> AppResult<()> {
        require(actor, Permission::ManageUsers)?;
        let user = self.get(id)?;
        validate_password(new_password)?;

        self.db.users().set_password(id, &hash_password(new_password)?)?;
        self.sessions.destroy_user(id)?;

        self.db
            .logs()
            .log(&actor.username, "user.reset_password", Some(&user.username))?;

        Ok(())
    }

    /// Create the first administrator when there are no users at all.
    /// Returns the generated password when none was configured.
    pub fn bootstrap_admin(&self, config: &BootstrapConfig) -> AppResult<Option<(User, Option<String>)>> {
        if self.db.users().count()? > 0 {
            return Ok(None);
        }

        let generated = config.admin_password.is_none().then(|| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect::<String>()
        });
        let password = config
            .admin_password
            .clone()
            .or_else(|| generated.clone())
            .unwrap_or_default();

        let user = self.insert(&NewUser {
            username: config.admin_username.clone(),
            email: config.admin_email.clone(),
            phone: None,
            department: None,
            password,
            role: Some(Role::Administrator.to_string()),
        })?;

        self.db
            .logs()
            .log("system", "user.bootstrap", Some(&user.username))?;
        warn!("Created initial administrator '{}'", user.username);

        Ok(Some((user, generated)))
    }
}

/// Fail if moving `user` to (`role`, `active`) would leave no active administrator.
/// Runs on the connection of the transaction that writes the change.
fn ensure_admin_remains(conn: &Connection, user: &User, role: Role, active: bool) -> AppResult<()> {
    let was_counted = user.is_active && user.role == Role::Administrator;
    let still_counted = active && role == Role::Administrator;

    if was_counted && !still_counted && UserRepository::count_active_admins_tx(conn, user.id)? == 0 {
        return Err(AppError::validation(
            "At least one active Administrator must remain",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_user;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: format!("{}@kemri.org", username),
            phone: Some("0700 000000".into()),
            department: Some("Finance".into()),
            password: "password123".into(),
            role: Some("supervisor".into()),
        }
    }

    #[test]
    fn test_create_user() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let service = UserService::new(&db, &sessions);

        let user = service.create(&new_user("jdoe"), &admin).unwrap();
        assert_eq!(user.role, Role::Supervisor);
        assert!(user.password_hash.starts_with("$argon2"));

        assert!(matches!(
            service.create(&new_user("JDOE"), &admin),
            Err(AppError::AlreadyExists(_))
        ));

        let mut other = new_user("jane");
        other.email = "JDOE@kemri.org".into();
        assert!(matches!(service.create(&other, &admin), Err(AppError::AlreadyExists(_))));
    }

    #[test]
    fn test_only_admins_manage_users() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let registry = create_user(&db, "registry", Role::Registry);

        let result = UserService::new(&db, &sessions).create(&new_user("jdoe"), &registry);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_last_admin_is_protected() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let admin_id = admin.id.unwrap();
        let service = UserService::new(&db, &sessions);

        assert!(matches!(
            service.set_active(admin_id, false, &admin),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.change_role(admin_id, Role::User, &admin),
            Err(AppError::Validation(_))
        ));

        let second = create_user(&db, "admin2", Role::Administrator);
        service.change_role(admin_id, Role::Registry, &second).unwrap();

        // Demoted, so no longer allowed to manage users
        let demoted = db.users().find_by_id(admin_id).unwrap().unwrap();
        assert!(matches!(
            service.delete(second.id.unwrap(), &demoted),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.set_active(second.id.unwrap(), false, &second),
            Err(AppError::Validation(_))
        ));
        assert_eq!(db.users().count_active_admins(None).unwrap(), 1);
    }

    #[test]
    fn test_simultaneous_deactivations_keep_one_admin() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let first = create_user(&db, "admin1", Role::Administrator);
        let second = create_user(&db, "admin2", Role::Administrator);
        let barrier = std::sync::Barrier::new(2);

        let results: Vec<AppResult<User>> = std::thread::scope(|s| {
            let handles = [(&first, &second), (&second, &first)].map(|(actor, target)| {
                let (db, sessions, barrier) = (&db, &sessions, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    UserService::new(db, sessions).set_active(target.id.unwrap(), false, actor)
                })
            });
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(AppError::Validation(_)))));
        assert_eq!(db.users().count_active_admins(None).unwrap(), 1);
    }

    #[test]
    fn test_rejected_change_leaves_no_trace() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let service = UserService::new(&db, &sessions);

        assert!(service.delete(admin.id.unwrap(), &create_user(&db, "boss", Role::Administrator)).is_ok());
        let boss = db.users().find_by_username("boss").unwrap().unwrap();
        assert!(service.change_role(boss.id.unwrap(), Role::User, &boss).is_err());
        let deactivate = UserUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(service.update(boss.id.unwrap(), &deactivate, &boss).is_err());

        let logs = db.logs().recent_system_logs(10, Some("boss")).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "user.delete");
        assert_eq!(db.users().find_by_id(boss.id.unwrap()).unwrap().unwrap().role, Role::Administrator);
    }

    #[test]
    fn test_deactivate_drops_sessions() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let clerk = create_user(&db, "clerk", Role::User);
        let token = sessions.create(clerk.id.unwrap(), "clerk").unwrap();

        UserService::new(&db, &sessions)
            .set_active(clerk.id.unwrap(), false, &admin)
            .unwrap();

        assert!(sessions.validate(&token).is_err());
        assert!(!db.users().find_by_id(clerk.id.unwrap()).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_delete_user() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let clerk = create_user(&db, "clerk", Role::User);
        let service = UserService::new(&db, &sessions);

        assert!(service.delete(admin.id.unwrap(), &admin).is_err());
        service.delete(clerk.id.unwrap(), &admin).unwrap();
        assert!(matches!(service.get(clerk.id.unwrap()), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_bootstrap_admin() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let service = UserService::new(&db, &sessions);

        let (admin, password) = service
            .bootstrap_admin(&BootstrapConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Administrator);
        assert_eq!(password.map(|p| p.len()), Some(16));

        assert!(service.bootstrap_admin(&BootstrapConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_reset_password() {
        let db = Database::open_in_memory().unwrap();
        let sessions = SessionStore::new(1800);
        let admin = create_user(&db, "admin", Role::Administrator);
        let clerk = create_user(&db, "clerk", Role::User);
        let service = UserService::new(&db, &sessions);

        assert!(service.reset_password(clerk.id.unwrap(), "short", &admin).is_err());
        service
            .reset_password(clerk.id.unwrap(), "brand-new-pass", &admin)
            .unwrap();

        let stored = db.users().find_by_id(clerk.id.unwrap()).unwrap().unwrap().password_hash;
        assert!(crate::services::auth::verify_password("brand-new-pass", &stored)
            .unwrap()
            .is_valid());
    }
}
