use crate::models::{BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT};
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Permissions every installation carries: (content_type, codename, name).
pub const SEEDED_PERMISSIONS: &[(&str, &str, &str)] = &[
    (BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT, "Can edit content"),
    ("post", "add_post", "Can add post"),
    ("post", "change_post", "Can change post"),
    ("post", "delete_post", "Can delete post"),
    ("post", "view_post", "Can view post"),
];

/// Creates every table and seeds the permission catalogue. Safe to run repeatedly.
pub fn setup_database(conn: &mut Connection) -> Result<(), SetupError> {
    conn.pragma_update(None, "foreign_keys", true)?;
    let tx = conn.transaction()?;

    log::info!("Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            is_staff INTEGER NOT NULL DEFAULT 0,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            date_joined TEXT NOT NULL,
            last_login TEXT
        )",
        [],
    )?;

    log::info!("Creating 'auth_groups' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS auth_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    log::info!("Creating 'auth_permissions' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS auth_permissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_type TEXT NOT NULL,
            codename TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (content_type, codename)
        )",
        [],
    )?;

    log::info!("Creating relation tables...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS group_permissions (
            group_id INTEGER NOT NULL,
            permission_id INTEGER NOT NULL,
            PRIMARY KEY (group_id, permission_id),
            FOREIGN KEY (group_id) REFERENCES auth_groups(id) ON DELETE CASCADE,
            FOREIGN KEY (permission_id) REFERENCES auth_permissions(id) ON DELETE CASCADE
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS user_groups (
            user_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, group_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (group_id) REFERENCES auth_groups(id) ON DELETE CASCADE
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS user_permissions (
            user_id INTEGER NOT NULL,
            permission_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, permission_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (permission_id) REFERENCES auth_permissions(id) ON DELETE CASCADE
        )",
        [],
    )?;

    log::info!("Creating 'blog_posts' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS blog_posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL CHECK(length(title) <= 200),
            content TEXT NOT NULL,
            pub_date TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'posts' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL CHECK(length(title) <= 200),
            content TEXT NOT NULL,
            author TEXT NOT NULL CHECK(length(author) <= 100),
            published_date TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS posts_published_date_idx ON posts (published_date, id)",
        [],
    )?;

    seed_permissions(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_permissions(tx: &Transaction) -> RusqliteResult<()> {
    log::info!("Seeding permissions...");
    for (content_type, codename, name) in SEEDED_PERMISSIONS {
        tx.execute(
            "INSERT OR IGNORE INTO auth_permissions (content_type, codename, name) VALUES (?1, ?2, ?3)",
            [content_type, codename, name],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&mut conn).expect("first setup");
        setup_database(&mut conn).expect("second setup");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM auth_permissions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, SEEDED_PERMISSIONS.len() as i64);
    }

    #[test]
    fn test_can_edit_content_is_seeded() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&mut conn).unwrap();

        let name: String = conn
            .query_row(
                "SELECT name FROM auth_permissions WHERE content_type = 'blogpost' AND codename = 'can_edit_content'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Can edit content");
    }
}
