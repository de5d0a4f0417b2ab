use crate::config::Config;
use crate::helper::render_helpers;
use crate::routes::{self, posts};
use crate::DbPool;
use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::body::MessageBody;
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::Method;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::rngs::StdRng;
use std::path::Path;
use tera::Tera;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionKeyError {
    #[error("SESSION_SECRET_KEY is not a valid hex string: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("SESSION_SECRET_KEY is not usable as a cookie key: {0}")]
    Key(String),
}

/// GET routes that hand out a CSRF cookie because they render a protected form.
const CSRF_FORM_PAGES: &[&str] = &[
    "/contact/",
    "/register/",
    "/login/",
    "/logout/",
    posts::POST_CREATE_PATTERN,
    posts::POST_UPDATE_PATTERN,
    posts::POST_DELETE_PATTERN,
];

pub fn build_pool(database_file: &Path) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_file)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().build(manager)
}

pub fn session_key(hex_key: &str) -> Result<Key, SessionKeyError> {
    let bytes = hex::decode(hex_key)?;
    Key::try_from(bytes.as_slice()).map_err(|e| SessionKeyError::Key(e.to_string()))
}

/// Assembles the full application: middleware stack, shared data and every route.
pub fn build_app(
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    tera: web::Data<Tera>,
    session_key: Key,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key)
        .cookie_secure(config.use_secure_cookies)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .build();

    let csrf = CSRF_FORM_PAGES
        .iter()
        .fold(CsrfMiddleware::<StdRng>::new(), |csrf, path| {
            csrf.set_cookie(Method::GET, *path)
        });

    let static_dir = config.static_dir.clone();

    App::new()
        .wrap(csrf)
        .wrap(session_mw)
        .wrap(Logger::default())
        .wrap(
            DefaultHeaders::new()
                .add(("X-Content-Type-Options", "nosniff"))
                .add(("X-Frame-Options", "DENY"))
                .add(("Referrer-Policy", "same-origin")),
        )
        .app_data(web::PathConfig::default().error_handler(render_helpers::path_not_found))
        .app_data(config)
        .app_data(pool)
        .app_data(tera)
        .configure(routes::pages::config_pages)
        .configure(routes::accounts::config_accounts)
        .configure(routes::posts::config_posts)
        .service(actix_files::Files::new("/static", static_dir))
        .default_service(web::route().to(routes::pages::not_found_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_requires_64_bytes() {
        assert!(session_key(&"ab".repeat(64)).is_ok());
        assert!(matches!(session_key("zz"), Err(SessionKeyError::Hex(_))));
        assert!(matches!(session_key(&"ab".repeat(8)), Err(SessionKeyError::Key(_))));
    }
}
