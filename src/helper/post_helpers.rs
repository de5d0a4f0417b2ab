use crate::error::AppError;
use crate::helper::account_helpers::get_conn;
use crate::helper::form_helpers::PostForm;
use crate::models::db_operations::posts_db_operations;
use crate::models::{BlogPost, Post};
use crate::DbPool;
use chrono::Utc;

/// Stamps the author and the publication time, returning the new post id.
pub fn create_post(pool: &DbPool, form: &PostForm, author: &str) -> Result<i64, AppError> {
    let conn = get_conn(pool)?;
    let id = posts_db_operations::insert_post(&conn, &form.title, &form.content, author, &Utc::now())?;
    log::info!("Post {} created by '{}'", id, author);
    Ok(id)
}

pub fn fetch_post(pool: &DbPool, post_id: i64) -> Result<Option<Post>, AppError> {
    let conn = get_conn(pool)?;
    Ok(posts_db_operations::read_post(&conn, post_id)?)
}

pub fn fetch_all_posts(pool: &DbPool) -> Result<Vec<Post>, AppError> {
    let conn = get_conn(pool)?;
    Ok(posts_db_operations::read_all_posts(&conn)?)
}

/// Returns false when the post does not exist.
pub fn update_post(pool: &DbPool, post_id: i64, form: &PostForm, author: &str) -> Result<bool, AppError> {
    let conn = get_conn(pool)?;
    let changed = posts_db_operations::update_post(&conn, post_id, &form.title, &form.content, author)?;
    if changed > 0 {
        log::info!("Post {} updated by '{}'", post_id, author);
    }
    Ok(changed > 0)
}

pub fn delete_post(pool: &DbPool, post_id: i64) -> Result<bool, AppError> {
    let conn = get_conn(pool)?;
    let removed = posts_db_operations::delete_post(&conn, post_id)?;
    if removed > 0 {
        log::info!("Post {} deleted", post_id);
    }
    Ok(removed > 0)
}

pub fn fetch_all_blog_posts(pool: &DbPool) -> Result<Vec<BlogPost>, AppError> {
    let conn = get_conn(pool)?;
    Ok(posts_db_operations::read_all_blog_posts(&conn)?)
}
