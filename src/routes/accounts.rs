use crate::config::Config;
use crate::error::AppError;
use crate::helper::account_helpers::{self, RegistrationOutcome};
use crate::helper::form_helpers::{FormErrors, LoginForm, RegistrationForm, INVALID_LOGIN};
use crate::helper::render_helpers::{base_context, redirect, render, safe_next, set_notification};
use crate::middleware::{AuthenticatedUser, LOGIN_URL};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tera::Tera;

pub const LOGIN_REDIRECT_URL: &str = "/profile/";
pub const LOGOUT_REDIRECT_URL: &str = LOGIN_URL;

#[derive(Deserialize)]
struct RegistrationSubmission {
    csrf_token: CsrfToken,
    #[serde(flatten)]
    form: RegistrationForm,
}

impl CsrfGuarded for RegistrationSubmission {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct LoginSubmission {
    csrf_token: CsrfToken,
    #[serde(default)]
    next: String,
    #[serde(flatten)]
    form: LoginForm,
}

impl CsrfGuarded for LoginSubmission {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct LogoutSubmission {
    csrf_token: CsrfToken,
}

impl CsrfGuarded for LogoutSubmission {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct NextQuery {
    next: Option<String>,
}

pub fn config_accounts(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/register/")
            .name("register")
            .route(web::get().to(show_registration_form))
            .route(web::post().to(handle_registration)),
    )
    .service(
        web::resource("/login/")
            .name("login")
            .route(web::get().to(show_login_form))
            .route(web::post().to(handle_login)),
    )
    .service(
        web::resource("/logout/")
            .name("logout")
            .route(web::get().to(show_logout_confirmation))
            .route(web::post().to(handle_logout)),
    )
    .service(web::resource("/profile/").name("profile").route(web::get().to(show_profile)));
}

// --- Registration ---

fn render_registration(
    session: &Session,
    tera: &Tera,
    form: &RegistrationForm,
    errors: Option<&FormErrors>,
    csrf_token: &str,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(session);
    ctx.insert("form", form);
    ctx.insert("errors", &errors.cloned().unwrap_or_default());
    ctx.insert("csrf_token", csrf_token);
    render(tera, "registration/register.html", &ctx)
}

async fn show_registration_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    render_registration(&session, &tera, &RegistrationForm::default(), None, token.get())
}

async fn handle_registration(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: Csrf<web::Form<RegistrationSubmission>>,
) -> Result<HttpResponse, AppError> {
    let submission = form.into_inner().into_inner();
    let registration = submission.form.cleaned();

    match account_helpers::register_user(&pool, &registration, config.password_hash_cost)? {
        RegistrationOutcome::Registered(user) => {
            account_helpers::login(&session, &user)?;
            set_notification(&session, "Your account has been created.", "success");
            Ok(redirect(LOGIN_REDIRECT_URL))
        }
        RegistrationOutcome::Invalid(errors) => render_registration(
            &session,
            &tera,
            &registration,
            Some(&errors),
            submission.csrf_token.get(),
        ),
    }
}

// --- Login / Logout ---

fn render_login(
    session: &Session,
    tera: &Tera,
    form: &LoginForm,
    errors: Option<&FormErrors>,
    next: &str,
    csrf_token: &str,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(session);
    ctx.insert("form", form);
    ctx.insert("errors", &errors.cloned().unwrap_or_default());
    ctx.insert("next", next);
    ctx.insert("csrf_token", csrf_token);
    render(tera, "registration/login.html", &ctx)
}

async fn show_login_form(
    session: Session,
    tera: web::Data<Tera>,
    query: web::Query<NextQuery>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    if account_helpers::session_user_id(&session).is_some() {
        return Ok(redirect(LOGIN_REDIRECT_URL));
    }
    let next = query.next.clone().unwrap_or_default();
    render_login(&session, &tera, &LoginForm::default(), None, &next, token.get())
}

async fn handle_login(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginSubmission>>,
) -> Result<HttpResponse, AppError> {
    let submission = form.into_inner().into_inner();
    let login_form = submission.form;

    let mut errors = login_form.validate();
    if errors.is_empty() {
        match account_helpers::authenticate(&pool, &login_form)? {
            Some(user) => {
                account_helpers::login(&session, &user)?;
                log::info!("User '{}' logged in", user.username);
                let target = safe_next(Some(&submission.next), LOGIN_REDIRECT_URL);
                return Ok(redirect(&target));
            }
            None => {
                log::warn!("Failed login attempt for '{}'", login_form.username.trim());
                errors.add_non_field(INVALID_LOGIN);
            }
        }
    }

    render_login(
        &session,
        &tera,
        &login_form,
        Some(&errors),
        &submission.next,
        submission.csrf_token.get(),
    )
}

async fn show_logout_confirmation(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> Result<HttpResponse, AppError> {
    if account_helpers::session_user_id(&session).is_none() {
        return Ok(redirect(LOGOUT_REDIRECT_URL));
    }
    let mut ctx = base_context(&session);
    ctx.insert("csrf_token", token.get());
    render(&tera, "registration/logout.html", &ctx)
}

async fn handle_logout(session: Session, _confirmation: Csrf<web::Form<LogoutSubmission>>) -> HttpResponse {
    if let Ok(Some(username)) = session.get::<String>(account_helpers::SESSION_USERNAME) {
        log::info!("User '{}' logged out", username);
    }
    account_helpers::logout(&session);
    redirect(LOGOUT_REDIRECT_URL)
}

// --- Profile ---

async fn show_profile(
    auth_user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let Some(profile) = account_helpers::fetch_profile(&pool, auth_user.id)? else {
        // The account vanished while the session was alive.
        account_helpers::logout(&session);
        return Ok(redirect(LOGIN_URL));
    };

    let mut ctx = base_context(&session);
    ctx.insert("profile", &profile);
    render(&tera, "profile.html", &ctx)
}
