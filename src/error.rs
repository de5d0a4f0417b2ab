use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("Session insert error: {0}")]
    SessionInsert(#[from] actix_session::SessionInsertError),
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        log::error!("Request failed: {}", self);
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body("Internal server error")
    }
}
