use crate::error::AppError;
use crate::helper::account_helpers::SESSION_USERNAME;
use crate::models::Notification;
use actix_session::{Session, SessionExt};
use actix_web::error::{InternalError, PathError};
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use tera::{Context, Tera};

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, location))
        .finish()
}

pub fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification {
        message: message.to_string(),
        r#type: r#type.to_string(),
    };
    if let Err(e) = session.insert("notification", &notification) {
        log::error!("Could not store notification in session: {}", e);
    }
}

/// Context shared by every page: the signed-in username and any pending notification.
pub fn base_context(session: &Session) -> Context {
    let mut ctx = Context::new();
    if let Ok(Some(username)) = session.get::<String>(SESSION_USERNAME) {
        ctx.insert("current_user", &username);
    }
    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }
    ctx
}

pub fn render_with_status(
    tera: &Tera,
    template: &str,
    ctx: &Context,
    status: StatusCode,
) -> Result<HttpResponse, AppError> {
    let rendered = tera.render(template, ctx).map_err(|e| {
        log::error!("Template rendering error for '{}': {}", template, e);
        e
    })?;
    Ok(HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> Result<HttpResponse, AppError> {
    render_with_status(tera, template, ctx, StatusCode::OK)
}

pub fn not_found(tera: &Tera, session: &Session) -> HttpResponse {
    let ctx = base_context(session);
    render_with_status(tera, "404.html", &ctx, StatusCode::NOT_FOUND)
        .unwrap_or_else(|_| HttpResponse::NotFound().body("Not found"))
}

/// Path segments that match a route but cannot be extracted (an id too large for
/// `i64`, say) get the same 404 page as missing records.
pub fn path_not_found(err: PathError, req: &HttpRequest) -> actix_web::Error {
    let response = match req.app_data::<web::Data<Tera>>() {
        Some(tera) => not_found(tera, &req.get_session()),
        None => HttpResponse::NotFound().body("Not found"),
    };
    InternalError::from_response(err, response).into()
}

/// Accepts only local absolute paths so the login page cannot bounce users off-site.
pub fn safe_next(next: Option<&str>, fallback: &str) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_local_paths() {
        assert_eq!(safe_next(Some("/post/new/"), "/profile/"), "/post/new/");
        assert_eq!(safe_next(Some("/post/?page=2"), "/profile/"), "/post/?page=2");
    }

    #[test]
    fn test_safe_next_rejects_external_targets() {
        assert_eq!(safe_next(Some("https://evil.example"), "/profile/"), "/profile/");
        assert_eq!(safe_next(Some("//evil.example"), "/profile/"), "/profile/");
        assert_eq!(safe_next(Some("/\\evil.example"), "/profile/"), "/profile/");
        assert_eq!(safe_next(Some(""), "/profile/"), "/profile/");
        assert_eq!(safe_next(None, "/profile/"), "/profile/");
    }

    #[test]
    fn test_redirect_sets_location() {
        let resp = redirect("/success/");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/success/");
    }
}
