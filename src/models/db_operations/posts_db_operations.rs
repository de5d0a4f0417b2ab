use crate::models::db_operations::users_db_operations::timestamp_column;
use crate::models::{to_db_timestamp, BlogPost, Post};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

fn post_from_row(row: &Row) -> Result<Post, RusqliteError> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        published_date: timestamp_column(row, 4)?,
    })
}

fn blog_post_from_row(row: &Row) -> Result<BlogPost, RusqliteError> {
    Ok(BlogPost {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        pub_date: timestamp_column(row, 3)?,
    })
}

// ====================================================================
// ============================ POSTS =================================
// ====================================================================

pub fn insert_post(
    conn: &Connection,
    title: &str,
    content: &str,
    author: &str,
    published_date: &DateTime<Utc>,
) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO posts (title, content, author, published_date) VALUES (?1, ?2, ?3, ?4)",
        params![title, content, author, to_db_timestamp(published_date)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_post(conn: &Connection, post_id: i64) -> Result<Option<Post>, RusqliteError> {
    conn.query_row(
        "SELECT id, title, content, author, published_date FROM posts WHERE id = ?1",
        [post_id],
        post_from_row,
    )
    .optional()
}

/// Oldest first; posts sharing a timestamp keep insertion order.
pub fn read_all_posts(conn: &Connection) -> Result<Vec<Post>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, author, published_date FROM posts ORDER BY published_date ASC, id ASC",
    )?;
    let rows = stmt.query_map([], post_from_row)?;
    rows.collect()
}

/// `published_date` is never touched after creation.
pub fn update_post(
    conn: &Connection,
    post_id: i64,
    title: &str,
    content: &str,
    author: &str,
) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE posts SET title = ?1, content = ?2, author = ?3 WHERE id = ?4",
        params![title, content, author, post_id],
    )
}

pub fn delete_post(conn: &Connection, post_id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])
}

// ====================================================================
// ========================== BLOG POSTS ==============================
// ====================================================================

pub fn insert_blog_post(
    conn: &Connection,
    title: &str,
    content: &str,
    pub_date: &DateTime<Utc>,
) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO blog_posts (title, content, pub_date) VALUES (?1, ?2, ?3)",
        params![title, content, to_db_timestamp(pub_date)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_blog_posts(conn: &Connection) -> Result<Vec<BlogPost>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, pub_date FROM blog_posts ORDER BY pub_date DESC, id DESC",
    )?;
    let rows = stmt.query_map([], blog_post_from_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_database;
    use chrono::TimeZone;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&mut conn).unwrap();
        conn
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_posts_list_oldest_first_regardless_of_insert_order() {
        let conn = test_conn();
        insert_post(&conn, "third", "c", "alice", &at(3)).unwrap();
        insert_post(&conn, "first", "c", "alice", &at(1)).unwrap();
        insert_post(&conn, "second", "c", "bob", &at(2)).unwrap();

        let titles: Vec<String> = read_all_posts(&conn).unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_update_keeps_published_date() {
        let conn = test_conn();
        let id = insert_post(&conn, "draft", "old body", "alice", &at(5)).unwrap();

        assert_eq!(update_post(&conn, id, "final", "new body", "bob").unwrap(), 1);

        let post = read_post(&conn, id).unwrap().unwrap();
        assert_eq!(post.title, "final");
        assert_eq!(post.content, "new body");
        assert_eq!(post.author, "bob");
        assert_eq!(post.published_date, at(5));
    }

    #[test]
    fn test_delete_removes_post() {
        let conn = test_conn();
        let id = insert_post(&conn, "doomed", "c", "alice", &at(1)).unwrap();

        assert_eq!(delete_post(&conn, id).unwrap(), 1);
        assert!(read_post(&conn, id).unwrap().is_none());
        assert_eq!(delete_post(&conn, id).unwrap(), 0);
    }

    #[test]
    fn test_update_missing_post_touches_nothing() {
        let conn = test_conn();
        assert_eq!(update_post(&conn, 999, "t", "c", "a").unwrap(), 0);
    }

    #[test]
    fn test_title_length_is_bounded_by_schema() {
        let conn = test_conn();
        let long_title = "x".repeat(201);
        assert!(insert_post(&conn, &long_title, "c", "alice", &at(1)).is_err());
    }

    #[test]
    fn test_blog_posts_newest_first() {
        let conn = test_conn();
        insert_blog_post(&conn, "older", "c", &at(1)).unwrap();
        insert_blog_post(&conn, "newer", "c", &at(9)).unwrap();

        let titles: Vec<String> = read_all_blog_posts(&conn).unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["newer", "older"]);
    }
}
