use crate::error::AppError;
use crate::helper::form_helpers::{ContactForm, FormErrors};
use crate::helper::post_helpers;
use crate::helper::render_helpers::{base_context, not_found, redirect, render};
use crate::middleware::PermissionRequired;
use crate::models::{BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tera::Tera;

#[derive(Deserialize)]
struct ContactSubmission {
    csrf_token: CsrfToken,
    #[serde(flatten)]
    form: ContactForm,
}

impl CsrfGuarded for ContactSubmission {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root_redirect))
        .service(
            web::resource("/posts/")
                .name("blog_post_list")
                .wrap(PermissionRequired::new(BLOG_POST_CONTENT_TYPE, CAN_EDIT_CONTENT))
                .route(web::get().to(blog_post_list)),
        )
        .service(
            web::resource("/contact/")
                .name("contact")
                .route(web::get().to(show_contact_form))
                .route(web::post().to(handle_contact)),
        )
        .service(web::resource("/success/").name("success").route(web::get().to(show_success)))
        .service(
            web::resource("/unauthorized/")
                .name("unauthorized")
                .route(web::get().to(show_unauthorized)),
        );
}

async fn root_redirect() -> HttpResponse {
    redirect("/post/")
}

async fn blog_post_list(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let posts = post_helpers::fetch_all_blog_posts(&pool)?;
    let mut ctx = base_context(&session);
    ctx.insert("posts", &posts);
    render(&tera, "post_list.html", &ctx)
}

fn render_contact(
    session: &Session,
    tera: &Tera,
    form: &ContactForm,
    errors: Option<&FormErrors>,
    csrf_token: &str,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(session);
    ctx.insert("form", form);
    ctx.insert("errors", &errors.cloned().unwrap_or_default());
    ctx.insert("csrf_token", csrf_token);
    render(tera, "contact.html", &ctx)
}

async fn show_contact_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    render_contact(&session, &tera, &ContactForm::default(), None, token.get())
}

async fn handle_contact(
    session: Session,
    tera: web::Data<Tera>,
    form: Csrf<web::Form<ContactSubmission>>,
) -> Result<HttpResponse, AppError> {
    let submission = form.into_inner().into_inner();
    let contact = submission.form.cleaned();
    let errors = contact.validate();
    if !errors.is_empty() {
        return render_contact(&session, &tera, &contact, Some(&errors), submission.csrf_token.get());
    }

    // Nothing is delivered; the submission is only acknowledged.
    log::info!(
        "Contact message received from {} <{}> ({} chars)",
        contact.name,
        contact.email,
        contact.message.chars().count()
    );
    Ok(redirect("/success/"))
}

async fn show_success(session: Session, tera: web::Data<Tera>) -> Result<HttpResponse, AppError> {
    render(&tera, "success.html", &base_context(&session))
}

async fn show_unauthorized(session: Session, tera: web::Data<Tera>) -> Result<HttpResponse, AppError> {
    render(&tera, "unauthorized.html", &base_context(&session))
}

pub async fn not_found_page(session: Session, tera: web::Data<Tera>) -> HttpResponse {
    not_found(&tera, &session)
}
