use crate::helper::account_helpers;
use crate::DbPool;
use actix_session::SessionExt;
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use std::future::{ready, Ready as StdReady};

pub const LOGIN_URL: &str = "/login/";
pub const UNAUTHORIZED_URL: &str = "/unauthorized/";

/// Builds `/login/?next=<path>` for the request that needed a session.
pub fn login_redirect_url(path_and_query: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(path_and_query.as_bytes()).collect();
    format!("{}?next={}", LOGIN_URL, next)
}

/// A signed-in, still active account taken from the session. Handlers that take
/// this argument redirect anonymous callers to the login page; sessions whose
/// account was removed or deactivated are purged and treated as anonymous.
#[derive(Serialize, Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        if let Some(user_id) = account_helpers::session_user_id(&session) {
            let Some(pool) = req.app_data::<web::Data<DbPool>>() else {
                log::error!("Database pool missing from app data; cannot resolve session user.");
                return ready(Err(actix_web::error::ErrorInternalServerError("Internal server error")));
            };
            match account_helpers::fetch_active_user(pool, user_id) {
                Ok(Some(user)) => {
                    return ready(Ok(AuthenticatedUser {
                        id: user.id,
                        username: user.username,
                    }))
                }
                Ok(None) => {
                    log::warn!("Session for user {} no longer maps to an active account", user_id);
                    account_helpers::logout(&session);
                }
                Err(e) => return ready(Err(e.into())),
            }
        }

        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| req.path());
        let response = HttpResponse::Found()
            .append_header((header::LOCATION, login_redirect_url(target)))
            .finish();
        ready(Err(actix_web::error::InternalError::from_response("Login required.", response).into()))
    }
}

// --- Permission gate ---

/// Lets the request through only when the session user holds `content_type.codename`;
/// everyone else is redirected to the unauthorized page.
pub struct PermissionRequired {
    content_type: &'static str,
    codename: &'static str,
}

impl PermissionRequired {
    pub fn new(content_type: &'static str, codename: &'static str) -> Self {
        PermissionRequired { content_type, codename }
    }
}

impl<S, B> Transform<S, ServiceRequest> for PermissionRequired
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PermissionRequiredMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(PermissionRequiredMiddleware {
            service,
            content_type: self.content_type,
            codename: self.codename,
        })
    }
}

pub struct PermissionRequiredMiddleware<S> {
    service: S,
    content_type: &'static str,
    codename: &'static str,
}

enum Decision {
    Allow,
    Deny,
    Fail,
}

impl<S> PermissionRequiredMiddleware<S> {
    fn decide(&self, req: &ServiceRequest) -> Decision {
        let Some(user_id) = account_helpers::session_user_id(&req.get_session()) else {
            return Decision::Deny;
        };
        let Some(pool) = req.app_data::<web::Data<DbPool>>() else {
            log::error!("Database pool missing from app data; denying access.");
            return Decision::Fail;
        };

        match account_helpers::user_has_permission(pool, user_id, self.content_type, self.codename) {
            Ok(true) => Decision::Allow,
            Ok(false) => {
                log::warn!(
                    "User {} lacks permission '{}.{}' for {}",
                    user_id,
                    self.content_type,
                    self.codename,
                    req.path()
                );
                Decision::Deny
            }
            Err(e) => {
                log::error!("Permission check failed: {}", e);
                Decision::Fail
            }
        }
    }
}

impl<S, B> Service<ServiceRequest> for PermissionRequiredMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>; // The response can be one of two body types
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let denied = match self.decide(&req) {
            Decision::Allow => {
                let fut = self.service.call(req);
                return Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                });
            }
            Decision::Deny => HttpResponse::Found()
                .append_header((header::LOCATION, UNAUTHORIZED_URL))
                .finish(),
            Decision::Fail => HttpResponse::InternalServerError().body("Internal server error"),
        };

        Box::pin(async move {
            let (http_req, _payload) = req.into_parts();
            Ok(ServiceResponse::new(http_req, denied.map_into_right_body()))
        })
    }
}
