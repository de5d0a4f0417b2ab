use crate::models::{from_db_timestamp, to_db_timestamp, User};
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, is_active, is_staff, is_superuser, date_joined, last_login";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

pub(crate) fn timestamp_column(row: &Row, idx: usize) -> Result<chrono::DateTime<Utc>, RusqliteError> {
    let raw: String = row.get(idx)?;
    from_db_timestamp(&raw)
        .map_err(|e| RusqliteError::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> Result<User, RusqliteError> {
    let last_login = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(
            from_db_timestamp(&raw)
                .map_err(|e| RusqliteError::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_active: row.get(5)?,
        is_staff: row.get(6)?,
        is_superuser: row.get(7)?,
        date_joined: timestamp_column(row, 8)?,
        last_login,
    })
}

/// Hashes the password and inserts the account, returning the new row id.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password: &str,
    cost: u32,
    is_superuser: bool,
) -> Result<i64, RusqliteError> {
    let hashed_password = hash(password, cost).map_err(bcrypt_to_rusqlite_error)?;
    let now = to_db_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO users (username, email, password_hash, is_staff, is_superuser, date_joined) VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
        params![username, email, hashed_password, is_superuser, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Names the `users` column behind a UNIQUE constraint failure, if that is what `err` is.
pub fn unique_violation_column(err: &RusqliteError) -> Option<&'static str> {
    match err {
        RusqliteError::SqliteFailure(e, Some(message))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            if message.contains("users.username") {
                Some("username")
            } else if message.contains("users.email") {
                Some("email")
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.collect()
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>, RusqliteError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [user_id],
        user_from_row,
    )
    .optional()
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, RusqliteError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
        [username],
        user_from_row,
    )
    .optional()
}

pub fn username_exists(conn: &Connection, username: &str) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 COLLATE NOCASE)",
        [username],
        |row| row.get(0),
    )
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 COLLATE NOCASE)",
        [email],
        |row| row.get(0),
    )
}

/// Returns the account when the password matches and the account is active.
pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<Option<User>, RusqliteError> {
    let hash: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
        .optional()?;

    let Some(hash) = hash else {
        return Ok(None);
    };
    if !verify(password, &hash).unwrap_or(false) {
        return Ok(None);
    }

    Ok(read_user_by_username(conn, username)?.filter(|user| user.is_active))
}

pub fn update_last_login(conn: &Connection, user_id: i64) -> Result<(), RusqliteError> {
    let now = to_db_timestamp(&Utc::now());
    conn.execute("UPDATE users SET last_login = ?1 WHERE id = ?2", params![now, user_id])?;
    Ok(())
}

pub fn set_active(conn: &Connection, user_id: i64, is_active: bool) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET is_active = ?1 WHERE id = ?2",
        params![is_active, user_id],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_database;

    const TEST_COST: u32 = 4;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_duplicate_insert_names_the_clashing_column() {
        let conn = test_conn();
        create_user(&conn, "alice", "alice@example.com", "s3cret-pass", TEST_COST, false).unwrap();

        let err = create_user(&conn, "ALICE", "other@example.com", "s3cret-pass", TEST_COST, false).unwrap_err();
        assert_eq!(unique_violation_column(&err), Some("username"));

        let err = create_user(&conn, "bob", "Alice@Example.com", "s3cret-pass", TEST_COST, false).unwrap_err();
        assert_eq!(unique_violation_column(&err), Some("email"));

        assert_eq!(unique_violation_column(&RusqliteError::QueryReturnedNoRows), None);
        assert_eq!(read_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_create_and_read_user() {
        let conn = test_conn();
        let id = create_user(&conn, "alice", "alice@example.com", "s3cret-pass", TEST_COST, false).unwrap();

        let user = read_user_by_id(&conn, id).unwrap().expect("user should exist");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert!(user.last_login.is_none());
    }

    #[test]
    fn test_duplicate_email_is_rejected_by_schema() {
        let conn = test_conn();
        create_user(&conn, "alice", "shared@example.com", "pw-one-111", TEST_COST, false).unwrap();
        let result = create_user(&conn, "bob", "shared@example.com", "pw-two-222", TEST_COST, false);
        assert!(result.is_err());
        assert_eq!(read_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_existence_checks_ignore_case() {
        let conn = test_conn();
        create_user(&conn, "Alice", "Alice@Example.com", "pw-one-111", TEST_COST, false).unwrap();
        assert!(username_exists(&conn, "alice").unwrap());
        assert!(email_exists(&conn, "alice@example.com").unwrap());
        assert!(!username_exists(&conn, "bob").unwrap());
    }

    #[test]
    fn test_verify_credentials() {
        let conn = test_conn();
        create_user(&conn, "alice", "alice@example.com", "correct-horse", TEST_COST, false).unwrap();

        assert!(verify_credentials(&conn, "alice", "correct-horse").unwrap().is_some());
        assert!(verify_credentials(&conn, "alice", "wrong").unwrap().is_none());
        assert!(verify_credentials(&conn, "nobody", "correct-horse").unwrap().is_none());
    }

    #[test]
    fn test_inactive_user_cannot_authenticate() {
        let conn = test_conn();
        let id = create_user(&conn, "alice", "alice@example.com", "correct-horse", TEST_COST, false).unwrap();
        set_active(&conn, id, false).unwrap();

        assert!(verify_credentials(&conn, "alice", "correct-horse").unwrap().is_none());
    }

    #[test]
    fn test_update_last_login() {
        let conn = test_conn();
        let id = create_user(&conn, "alice", "alice@example.com", "correct-horse", TEST_COST, false).unwrap();
        update_last_login(&conn, id).unwrap();

        let user = read_user_by_id(&conn, id).unwrap().unwrap();
        assert!(user.last_login.is_some());
    }
}
