//! API authentication: `Authorization: Bearer <token>` or HTTP Basic with
//! email and password.

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::auth::password::verify_password_blocking;
use crate::auth::tokens::TokenPurpose;
use crate::db::models::User;
use crate::db::roles::Permission;
use crate::db::users;
use crate::state::AppState;

/// Confirmed user authenticated for an API call.
#[derive(Debug, Clone)]
pub struct ApiUser {
    pub user: User,
    /// `true` when the credentials were an API token rather than a password.
    pub via_token: bool,
}

impl std::ops::Deref for ApiUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.user
    }
}

impl ApiUser {
    pub fn require(&self, perm: Permission) -> ApiResult<()> {
        if self.can(perm) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Insufficient permissions"))
        }
    }
}

enum Credentials {
    Bearer(String),
    Basic { email: String, password: String },
}

fn parse_authorization(value: &str) -> Option<Credentials> {
    let (scheme, rest) = value.trim().split_once(' ')?;
    let rest = rest.trim();
    if scheme.eq_ignore_ascii_case("bearer") {
        return (!rest.is_empty()).then(|| Credentials::Bearer(rest.to_string()));
    }
    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = STANDARD.decode(rest).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (email, password) = decoded.split_once(':')?;
        return Some(Credentials::Basic {
            email: email.to_string(),
            password: password.to_string(),
        });
    }
    None
}

async fn authenticate(state: &AppState, credentials: Credentials) -> ApiResult<Option<ApiUser>> {
    match credentials {
        Credentials::Bearer(token) => {
            let Ok(user_id) = state.tokens.verify_user(&token, TokenPurpose::Api) else {
                return Ok(None);
            };
            let conn = state.db.get()?;
            Ok(users::find_by_id(&conn, user_id)?.map(|user| ApiUser {
                user,
                via_token: true,
            }))
        }
        Credentials::Basic { email, password } => {
            if email.is_empty() {
                return Ok(None);
            }
            let user = {
                let conn = state.db.get()?;
                users::find_by_email(&conn, &email)?
            };
            let Some(user) = user else {
                return Ok(None);
            };
            if !verify_password_blocking(password, user.password_hash.clone()).await {
                return Ok(None);
            }
            Ok(Some(ApiUser {
                user,
                via_token: false,
            }))
        }
    }
}

impl FromRequestParts<AppState> for ApiUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_authorization)
            .ok_or_else(ApiError::unauthorized)?;

        let api_user = authenticate(state, credentials)
            .await?
            .ok_or_else(ApiError::unauthorized)?;
        if !api_user.confirmed {
            return Err(ApiError::forbidden("Unconfirmed account"));
        }
        users::ping(&*state.db.get()?, api_user.id)?;
        Ok(api_user)
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    /// Lifetime in seconds.
    pub expiration: i64,
}

/// Trade email and password for an API token. A token cannot be used to
/// obtain another one.
pub async fn issue_token(
    State(state): State<AppState>,
    api_user: ApiUser,
) -> ApiResult<Json<TokenResponse>> {
    if api_user.via_token {
        return Err(ApiError::unauthorized());
    }
    let token = state.tokens.issue(api_user.id, TokenPurpose::Api)?;
    tracing::info!(user_id = api_user.id, "API token issued");
    Ok(Json(TokenResponse {
        token,
        expiration: TokenPurpose::Api.lifetime().num_seconds(),
    }))
}
