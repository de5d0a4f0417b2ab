use crate::models::{Group, Permission, User};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension};

pub fn read_permission(
    conn: &Connection,
    content_type: &str,
    codename: &str,
) -> Result<Option<Permission>, RusqliteError> {
    conn.query_row(
        "SELECT id, content_type, codename, name FROM auth_permissions WHERE content_type = ?1 AND codename = ?2",
        [content_type, codename],
        |row| {
            Ok(Permission {
                id: row.get(0)?,
                content_type: row.get(1)?,
                codename: row.get(2)?,
                name: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Splits `"content_type.codename"` into its parts.
pub fn parse_qualified_permission(qualified: &str) -> Option<(&str, &str)> {
    let (content_type, codename) = qualified.split_once('.')?;
    if content_type.is_empty() || codename.is_empty() {
        return None;
    }
    Some((content_type, codename))
}

/// Fetches the named group, creating it when absent. The flag is true when it was created.
pub fn get_or_create_group(conn: &Connection, name: &str) -> Result<(Group, bool), RusqliteError> {
    let inserted = conn.execute("INSERT OR IGNORE INTO auth_groups (name) VALUES (?1)", [name])?;
    let id: i64 = conn.query_row("SELECT id FROM auth_groups WHERE name = ?1", [name], |row| row.get(0))?;
    Ok((Group { id, name: name.to_string() }, inserted > 0))
}

pub fn count_groups(conn: &Connection, name: &str) -> Result<i64, RusqliteError> {
    conn.query_row("SELECT COUNT(*) FROM auth_groups WHERE name = ?1", [name], |row| row.get(0))
}

// The composite primary keys make re-linking a no-op.
pub fn add_permission_to_group(conn: &Connection, group_id: i64, permission_id: i64) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR IGNORE INTO group_permissions (group_id, permission_id) VALUES (?1, ?2)",
        params![group_id, permission_id],
    )?;
    Ok(())
}

pub fn add_user_to_group(conn: &Connection, user_id: i64, group_id: i64) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
        params![user_id, group_id],
    )?;
    Ok(())
}

pub fn add_permission_to_user(conn: &Connection, user_id: i64, permission_id: i64) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES (?1, ?2)",
        params![user_id, permission_id],
    )?;
    Ok(())
}

pub fn group_has_permission(conn: &Connection, group_id: i64, permission_id: i64) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM group_permissions WHERE group_id = ?1 AND permission_id = ?2)",
        params![group_id, permission_id],
        |row| row.get(0),
    )
}

pub fn read_user_group_names(conn: &Connection, user_id: i64) -> Result<Vec<String>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT g.name FROM auth_groups g
         JOIN user_groups ug ON ug.group_id = g.id
         WHERE ug.user_id = ?1 ORDER BY g.name",
    )?;
    let rows = stmt.query_map([user_id], |row| row.get(0))?;
    rows.collect()
}

/// All permissions the user holds directly or through a group, as `content_type.codename`.
pub fn read_user_permission_names(conn: &Connection, user_id: i64) -> Result<Vec<String>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT p.content_type || '.' || p.codename FROM auth_permissions p
         WHERE p.id IN (SELECT permission_id FROM user_permissions WHERE user_id = ?1)
            OR p.id IN (SELECT gp.permission_id FROM group_permissions gp
                        JOIN user_groups ug ON ug.group_id = gp.group_id
                        WHERE ug.user_id = ?1)
         ORDER BY 1",
    )?;
    let rows = stmt.query_map([user_id], |row| row.get(0))?;
    rows.collect()
}

/// Inactive accounts hold nothing; superusers hold everything.
pub fn user_has_permission(
    conn: &Connection,
    user: &User,
    content_type: &str,
    codename: &str,
) -> Result<bool, RusqliteError> {
    if !user.is_active {
        return Ok(false);
    }
    if user.is_superuser {
        return Ok(true);
    }

    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM auth_permissions p
            WHERE p.content_type = ?2 AND p.codename = ?3
              AND (p.id IN (SELECT permission_id FROM user_permissions WHERE user_id = ?1)
                   OR p.id IN (SELECT gp.permission_id FROM group_permissions gp
                               JOIN user_groups ug ON ug.group_id = gp.group_id
                               WHERE ug.user_id = ?1))
        )",
        params![user.id, content_type, codename],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations;
    use crate::models::{ALL_USERS_GROUP, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT};
    use crate::setup::db_setup::setup_database;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&mut conn).unwrap();
        conn
    }

    fn make_user(conn: &Connection, username: &str, superuser: bool) -> User {
        let id = users_db_operations::create_user(
            conn,
            username,
            &format!("{}@example.com", username),
            "password-123",
            4,
            superuser,
        )
        .unwrap();
        users_db_operations::read_user_by_id(conn, id).unwrap().unwrap()
    }

    fn can_edit(conn: &Connection, user: &User) -> bool {
        user_has_permission(conn, user, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT).unwrap()
    }

    #[test]
    fn test_parse_qualified_permission() {
        assert_eq!(
            parse_qualified_permission("blogpost.can_edit_content"),
            Some(("blogpost", "can_edit_content"))
        );
        assert_eq!(parse_qualified_permission("can_edit_content"), None);
        assert_eq!(parse_qualified_permission(".x"), None);
    }

    #[test]
    fn test_get_or_create_group_is_idempotent() {
        let conn = test_conn();
        let (first, created) = get_or_create_group(&conn, ALL_USERS_GROUP).unwrap();
        assert!(created);
        let (second, created_again) = get_or_create_group(&conn, ALL_USERS_GROUP).unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(count_groups(&conn, ALL_USERS_GROUP).unwrap(), 1);
    }

    #[test]
    fn test_relinking_permission_does_not_duplicate() {
        let conn = test_conn();
        let (group, _) = get_or_create_group(&conn, ALL_USERS_GROUP).unwrap();
        let perm = read_permission(&conn, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT).unwrap().unwrap();
        add_permission_to_group(&conn, group.id, perm.id).unwrap();
        add_permission_to_group(&conn, group.id, perm.id).unwrap();

        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM group_permissions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 1);
        assert!(group_has_permission(&conn, group.id, perm.id).unwrap());
    }

    #[test]
    fn test_permission_through_group_membership() {
        let conn = test_conn();
        let user = make_user(&conn, "alice", false);
        assert!(!can_edit(&conn, &user));

        let (group, _) = get_or_create_group(&conn, ALL_USERS_GROUP).unwrap();
        let perm = read_permission(&conn, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT).unwrap().unwrap();
        add_permission_to_group(&conn, group.id, perm.id).unwrap();
        // The grant alone does nothing until the user joins.
        assert!(!can_edit(&conn, &user));

        add_user_to_group(&conn, user.id, group.id).unwrap();
        assert!(can_edit(&conn, &user));
        assert_eq!(read_user_group_names(&conn, user.id).unwrap(), vec![ALL_USERS_GROUP.to_string()]);
    }

    #[test]
    fn test_direct_permission_grant() {
        let conn = test_conn();
        let user = make_user(&conn, "bob", false);
        let perm = read_permission(&conn, BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT).unwrap().unwrap();
        add_permission_to_user(&conn, user.id, perm.id).unwrap();

        assert!(can_edit(&conn, &user));
        assert_eq!(
            read_user_permission_names(&conn, user.id).unwrap(),
            vec![perm.qualified_name()]
        );
    }

    #[test]
    fn test_superuser_and_inactive_rules() {
        let conn = test_conn();
        let mut admin = make_user(&conn, "root", true);
        assert!(can_edit(&conn, &admin));

        admin.is_active = false;
        assert!(!can_edit(&conn, &admin));
    }
}
