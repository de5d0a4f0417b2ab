use crate::error::AppError;
use crate::helper::form_helpers::{FormErrors, LoginForm, RegistrationForm};
use crate::models::db_operations::{permissions_db_operations, users_db_operations};
use crate::models::{User, ALL_USERS_GROUP, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT};
use crate::DbPool;
use actix_session::Session;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_USERNAME: &str = "username";

pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
pub const DUPLICATE_EMAIL: &str = "User with this Email address already exists.";

fn duplicate_message(field: &str) -> &'static str {
    if field == "email" {
        DUPLICATE_EMAIL
    } else {
        DUPLICATE_USERNAME
    }
}

pub enum RegistrationOutcome {
    Registered(User),
    Invalid(FormErrors),
}

#[derive(Serialize)]
pub struct Profile {
    pub user: User,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
}

pub(crate) fn get_conn(pool: &DbPool) -> Result<PooledConnection<SqliteConnectionManager>, AppError> {
    pool.get().map_err(AppError::Pool)
}

/// Validates the form, creates the account and enrolls it in the "All Users" group,
/// which carries `blogpost.can_edit_content`. All writes share one transaction.
pub fn register_user(
    pool: &DbPool,
    form: &RegistrationForm,
    password_cost: u32,
) -> Result<RegistrationOutcome, AppError> {
    let mut errors = form.validate();
    let mut conn = get_conn(pool)?;

    if !errors.has("username") && users_db_operations::username_exists(&conn, &form.username)? {
        errors.add("username", DUPLICATE_USERNAME);
    }
    if !errors.has("email") && users_db_operations::email_exists(&conn, &form.email)? {
        errors.add("email", DUPLICATE_EMAIL);
    }
    if !errors.is_empty() {
        return Ok(RegistrationOutcome::Invalid(errors));
    }

    let tx = conn.transaction()?;
    // A concurrent registration can claim the name between the check above and this insert.
    let user_id = match users_db_operations::create_user(
        &tx,
        &form.username,
        &form.email,
        &form.password1,
        password_cost,
        false,
    ) {
        Ok(id) => id,
        Err(e) => match users_db_operations::unique_violation_column(&e) {
            Some(field) => {
                log::warn!("Registration for '{}' lost a race on {}", form.username, field);
                errors.add(field, duplicate_message(field));
                return Ok(RegistrationOutcome::Invalid(errors));
            }
            None => return Err(e.into()),
        },
    };

    let (group, created) = permissions_db_operations::get_or_create_group(&tx, ALL_USERS_GROUP)?;
    if created {
        log::info!("Created group '{}'", ALL_USERS_GROUP);
    }
    let permission = permissions_db_operations::read_permission(&tx, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT)?
        .ok_or_else(|| AppError::MissingPermission(format!("{}.{}", BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT)))?;
    permissions_db_operations::add_permission_to_group(&tx, group.id, permission.id)?;
    permissions_db_operations::add_user_to_group(&tx, user_id, group.id)?;

    let user = users_db_operations::read_user_by_id(&tx, user_id)?.ok_or(AppError::Database(
        rusqlite::Error::QueryReturnedNoRows,
    ))?;
    tx.commit()?;

    log::info!("Registered new user '{}' (id {})", user.username, user.id);
    Ok(RegistrationOutcome::Registered(user))
}

/// Checks the credentials and stamps `last_login` on success.
pub fn authenticate(pool: &DbPool, form: &LoginForm) -> Result<Option<User>, AppError> {
    let conn = get_conn(pool)?;
    let user = users_db_operations::verify_credentials(&conn, form.username.trim(), &form.password)?;
    if let Some(user) = &user {
        users_db_operations::update_last_login(&conn, user.id)?;
    }
    Ok(user)
}

/// The account behind a session, as long as it still exists and may sign in.
pub fn fetch_active_user(pool: &DbPool, user_id: i64) -> Result<Option<User>, AppError> {
    let conn = get_conn(pool)?;
    Ok(users_db_operations::read_user_by_id(&conn, user_id)?.filter(|user| user.is_active))
}

pub fn fetch_profile(pool: &DbPool, user_id: i64) -> Result<Option<Profile>, AppError> {
    let conn = get_conn(pool)?;
    let Some(user) = users_db_operations::read_user_by_id(&conn, user_id)? else {
        return Ok(None);
    };
    let groups = permissions_db_operations::read_user_group_names(&conn, user_id)?;
    let permissions = if user.is_superuser {
        vec!["*".to_string()]
    } else {
        permissions_db_operations::read_user_permission_names(&conn, user_id)?
    };
    Ok(Some(Profile { user, groups, permissions }))
}

pub fn user_has_permission(
    pool: &DbPool,
    user_id: i64,
    content_type: &str,
    codename: &str,
) -> Result<bool, AppError> {
    let conn = get_conn(pool)?;
    match users_db_operations::read_user_by_id(&conn, user_id)? {
        Some(user) => Ok(permissions_db_operations::user_has_permission(&conn, &user, content_type, codename)?),
        None => Ok(false),
    }
}

/// Starts an authenticated session under a fresh session id.
pub fn login(session: &Session, user: &User) -> Result<(), AppError> {
    session.renew();
    session.insert(SESSION_USER_ID, user.id)?;
    session.insert(SESSION_USERNAME, &user.username)?;
    Ok(())
}

pub fn logout(session: &Session) {
    session.purge();
}

pub fn session_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>(SESSION_USER_ID).unwrap_or(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_database;

    const TEST_COST: u32 = 4;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = r2d2::Pool::builder()
            .max_size(2)
            .build(SqliteConnectionManager::file(&path))
            .unwrap();
        setup_database(&mut pool.get().unwrap()).unwrap();
        (dir, pool)
    }

    fn form(username: &str, email: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.into(),
            email: email.into(),
            password1: "Tr1cky-Passphrase".into(),
            password2: "Tr1cky-Passphrase".into(),
        }
    }

    fn registered(outcome: RegistrationOutcome) -> User {
        match outcome {
            RegistrationOutcome::Registered(user) => user,
            RegistrationOutcome::Invalid(errors) => panic!("unexpected errors: {:?}", errors),
        }
    }

    #[test]
    fn test_registration_creates_single_group_with_permission() {
        let (_dir, pool) = test_pool();
        let first = registered(register_user(&pool, &form("alice", "alice@example.com"), TEST_COST).unwrap());
        let second = registered(register_user(&pool, &form("bob", "bob@example.com"), TEST_COST).unwrap());

        let conn = pool.get().unwrap();
        assert_eq!(users_db_operations::read_all_users(&conn).unwrap().len(), 2);
        assert_eq!(permissions_db_operations::count_groups(&conn, ALL_USERS_GROUP).unwrap(), 1);

        let (group, _) = permissions_db_operations::get_or_create_group(&conn, ALL_USERS_GROUP).unwrap();
        let permission = permissions_db_operations::read_permission(&conn, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT)
            .unwrap()
            .unwrap();
        assert!(permissions_db_operations::group_has_permission(&conn, group.id, permission.id).unwrap());
        drop(conn);

        for user in [first, second] {
            assert!(user_has_permission(&pool, user.id, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT).unwrap());
        }
    }

    #[test]
    fn test_duplicate_username_and_email_are_field_errors() {
        let (_dir, pool) = test_pool();
        registered(register_user(&pool, &form("alice", "alice@example.com"), TEST_COST).unwrap());

        match register_user(&pool, &form("ALICE", "Alice@Example.com"), TEST_COST).unwrap() {
            RegistrationOutcome::Invalid(errors) => {
                assert!(errors.has("username"));
                assert!(errors.has("email"));
            }
            RegistrationOutcome::Registered(_) => panic!("duplicate registration must fail"),
        }

        let conn = pool.get().unwrap();
        assert_eq!(users_db_operations::read_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_authenticate_stamps_last_login() {
        let (_dir, pool) = test_pool();
        let user = registered(register_user(&pool, &form("alice", "alice@example.com"), TEST_COST).unwrap());
        assert!(user.last_login.is_none());

        let login_form = LoginForm { username: "alice".into(), password: "Tr1cky-Passphrase".into() };
        let authed = authenticate(&pool, &login_form).unwrap().expect("credentials are valid");
        assert_eq!(authed.id, user.id);
        assert!(fetch_profile(&pool, user.id).unwrap().unwrap().user.last_login.is_some());

        let bad_form = LoginForm { username: "alice".into(), password: "nope".into() };
        assert!(authenticate(&pool, &bad_form).unwrap().is_none());
    }

    #[test]
    fn test_profile_lists_group_and_permission() {
        let (_dir, pool) = test_pool();
        let user = registered(register_user(&pool, &form("alice", "alice@example.com"), TEST_COST).unwrap());

        let profile = fetch_profile(&pool, user.id).unwrap().unwrap();
        assert_eq!(profile.groups, vec![ALL_USERS_GROUP.to_string()]);
        assert_eq!(profile.permissions, vec!["blogpost.can_edit_content".to_string()]);
        assert!(fetch_profile(&pool, 9999).unwrap().is_none());
    }
}
