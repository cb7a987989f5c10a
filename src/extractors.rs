use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::session;
use crate::db::models::User;
use crate::db::roles::Permission;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The logged-in user, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl CurrentUser {
    /// Fail with 403 unless the user's role carries `perm`.
    pub fn require(&self, perm: Permission) -> AppResult<()> {
        if self.can(perm) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to do that.".to_string(),
            ))
        }
    }

    /// Fail with 403 unless this is `owner` or an administrator.
    pub fn require_self_or_admin(&self, owner_id: i64) -> AppResult<()> {
        if self.id == owner_id || self.is_administrator() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You can only change your own content.".to_string(),
            ))
        }
    }
}

/// Extractor that requires a session. Anonymous visitors are sent to the
/// login page with a `next` pointing back here.
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| parts.uri.path().to_string());
                AppError::LoginRequired(next)
            })
    }
}

/// Optional user extractor; `None` for anonymous visitors.
pub struct MaybeUser(pub Option<CurrentUser>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// Paths an unconfirmed user may still reach.
fn allowed_while_unconfirmed(path: &str) -> bool {
    ["/auth/", "/assets/", "/uploads/", "/api/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Resolve the session cookie into a [`CurrentUser`], record activity, and
/// keep unconfirmed accounts on the confirmation page.
pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = cookie_value(req.headers(), &state.config.auth.cookie_name).map(str::to_string);

    if let Some(token) = token {
        match lookup_session(&state, &token) {
            Ok(Some(user)) => {
                if !user.confirmed && !allowed_while_unconfirmed(req.uri().path()) {
                    return Redirect::to("/auth/unconfirmed/").into_response();
                }
                req.extensions_mut().insert(CurrentUser(user));
            }
            Ok(None) => {}
            Err(e) => return e.into_response(),
        }
    }

    next.run(req).await
}

fn lookup_session(state: &AppState, token: &str) -> AppResult<Option<User>> {
    let conn = state.db.get()?;
    let user = session::find_session_user(&conn, token)?;
    if let Some(ref user) = user {
        users::ping(&conn, user.id)?;
    }
    Ok(user)
}

/// Value of the cookie called `name`, if the request carries one.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
