use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The application's account record.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct Permission {
    pub id: i64,
    pub content_type: String,
    pub codename: String,
    pub name: String,
}

impl Permission {
    /// The `content_type.codename` form used by permission checks.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.content_type, self.codename)
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub published_date: DateTime<Utc>,
}

impl Post {
    pub fn absolute_url(&self) -> String {
        post_detail_url(self.id)
    }
}

pub fn post_detail_url(id: i64) -> String {
    format!("/post/{}/", id)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

pub const ALL_USERS_GROUP: &str = "All Users";
pub const BLOG_POST_CONTENT_TYPE: &str = "blogpost";
pub const CAN_EDIT_CONTENT: &str = "can_edit_content";

/// Fixed-width UTC text so that lexical order in SQLite matches chronological order.
pub fn to_db_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_db_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

pub mod db_operations;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_chronologically_as_text() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(1);
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 1).unwrap();

        let mut texts = vec![
            to_db_timestamp(&later),
            to_db_timestamp(&fractional),
            to_db_timestamp(&whole),
        ];
        texts.sort();
        assert_eq!(
            texts,
            vec![
                to_db_timestamp(&whole),
                to_db_timestamp(&fractional),
                to_db_timestamp(&later)
            ]
        );
    }

    #[test]
    fn test_timestamp_survives_storage_format() {
        let value = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let parsed = from_db_timestamp(&to_db_timestamp(&value)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_post_url_uses_identifier() {
        let post = Post {
            id: 42,
            title: "t".into(),
            content: "c".into(),
            author: "a".into(),
            published_date: Utc::now(),
        };
        assert_eq!(post.absolute_url(), "/post/42/");
    }
}
