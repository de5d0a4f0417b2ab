use crate::error::AppError;
use crate::helper::form_helpers::{FormErrors, PostForm};
use crate::helper::post_helpers;
use crate::helper::render_helpers::{base_context, not_found, redirect, render, set_notification};
use crate::middleware::AuthenticatedUser;
use crate::models::{post_detail_url, Post};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tera::Tera;

pub const POST_LIST_URL: &str = "/post/";
pub const POST_CREATE_PATTERN: &str = "/post/new/";
pub const POST_DETAIL_PATTERN: &str = r"/post/{id:\d+}/";
pub const POST_UPDATE_PATTERN: &str = r"/post/{id:\d+}/edit/";
pub const POST_DELETE_PATTERN: &str = r"/post/{id:\d+}/delete/";

#[derive(Deserialize)]
struct PostSubmission {
    csrf_token: CsrfToken,
    #[serde(flatten)]
    form: PostForm,
}

impl CsrfGuarded for PostSubmission {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct DeleteConfirmation {
    csrf_token: CsrfToken,
}

impl CsrfGuarded for DeleteConfirmation {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_posts(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(POST_LIST_URL).name("post_list").route(web::get().to(list_posts)))
        .service(
            web::resource(POST_CREATE_PATTERN)
                .name("post_create")
                .route(web::get().to(show_create_form))
                .route(web::post().to(create_post_action)),
        )
        .service(
            web::resource(POST_DETAIL_PATTERN)
                .name("post_detail")
                .route(web::get().to(show_post)),
        )
        .service(
            web::resource(POST_UPDATE_PATTERN)
                .name("post_update")
                .route(web::get().to(show_update_form))
                .route(web::post().to(update_post_action)),
        )
        .service(
            web::resource(POST_DELETE_PATTERN)
                .name("post_delete")
                .route(web::get().to(show_delete_confirmation))
                .route(web::post().to(delete_post_action)),
        );
}

fn render_post_form(
    session: &Session,
    tera: &Tera,
    form: &PostForm,
    errors: Option<&FormErrors>,
    post: Option<&Post>,
    csrf_token: &str,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(session);
    ctx.insert("form", form);
    ctx.insert("errors", &errors.cloned().unwrap_or_default());
    if let Some(post) = post {
        ctx.insert("post", post);
    }
    ctx.insert("csrf_token", csrf_token);
    render(tera, "posts/post_form.html", &ctx)
}

// --- Read ---

async fn list_posts(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let posts = post_helpers::fetch_all_posts(&pool)?;
    let mut ctx = base_context(&session);
    ctx.insert("posts", &posts);
    render(&tera, "posts/post_list.html", &ctx)
}

async fn show_post(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let Some(post) = post_helpers::fetch_post(&pool, path.into_inner())? else {
        return Ok(not_found(&tera, &session));
    };
    let mut ctx = base_context(&session);
    ctx.insert("post", &post);
    render(&tera, "posts/post_detail.html", &ctx)
}

// --- Create ---

async fn show_create_form(
    _auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    render_post_form(&session, &tera, &PostForm::default(), None, None, token.get())
}

async fn create_post_action(
    auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<PostSubmission>>,
) -> Result<HttpResponse, AppError> {
    let submission = form.into_inner().into_inner();
    let post_form = submission.form.cleaned();
    let errors = post_form.validate();
    if !errors.is_empty() {
        return render_post_form(&session, &tera, &post_form, Some(&errors), None, submission.csrf_token.get());
    }

    let post_id = post_helpers::create_post(&pool, &post_form, &auth_user.username)?;
    set_notification(&session, "Post created.", "success");
    Ok(redirect(&post_detail_url(post_id)))
}

// --- Update ---

async fn show_update_form(
    _auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    let Some(post) = post_helpers::fetch_post(&pool, path.into_inner())? else {
        return Ok(not_found(&tera, &session));
    };
    let form = PostForm {
        title: post.title.clone(),
        content: post.content.clone(),
    };
    render_post_form(&session, &tera, &form, None, Some(&post), token.get())
}

async fn update_post_action(
    auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    form: Csrf<web::Form<PostSubmission>>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let Some(post) = post_helpers::fetch_post(&pool, post_id)? else {
        return Ok(not_found(&tera, &session));
    };

    let submission = form.into_inner().into_inner();
    let post_form = submission.form.cleaned();
    let errors = post_form.validate();
    if !errors.is_empty() {
        return render_post_form(
            &session,
            &tera,
            &post_form,
            Some(&errors),
            Some(&post),
            submission.csrf_token.get(),
        );
    }

    if !post_helpers::update_post(&pool, post_id, &post_form, &auth_user.username)? {
        return Ok(not_found(&tera, &session));
    }
    set_notification(&session, "Post updated.", "success");
    Ok(redirect(&post.absolute_url()))
}

// --- Delete ---

async fn show_delete_confirmation(
    _auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    let Some(post) = post_helpers::fetch_post(&pool, path.into_inner())? else {
        return Ok(not_found(&tera, &session));
    };
    let mut ctx = base_context(&session);
    ctx.insert("post", &post);
    ctx.insert("csrf_token", token.get());
    render(&tera, "posts/post_confirm_delete.html", &ctx)
}

async fn delete_post_action(
    _auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    _confirmation: Csrf<web::Form<DeleteConfirmation>>,
) -> Result<HttpResponse, AppError> {
    if !post_helpers::delete_post(&pool, path.into_inner())? {
        return Ok(not_found(&tera, &session));
    }
    set_notification(&session, "Post deleted.", "success");
    Ok(redirect(POST_LIST_URL))
}
