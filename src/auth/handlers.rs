use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use validator::Validate;

use crate::auth::forms::{
    checked, error_messages, ChangeEmailForm, ChangePasswordForm, LoginForm, RegistrationForm,
    ResetPasswordForm, ResetPasswordRequestForm,
};
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::session;
use crate::auth::tokens::TokenPurpose;
use crate::db::models::User;
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, CurrentUser};
use crate::flash;
use crate::mail::{ChangeEmailEmail, ConfirmEmail, ResetPasswordEmail};
use crate::routes::home::Html;
use crate::routes::layout::Layout;
use crate::routes::profile_url;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub username: String,
    pub email: String,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub email: String,
    pub action: String,
}

#[derive(Template)]
#[template(path = "auth/unconfirmed.html")]
pub struct UnconfirmedTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "auth/reset_password_request.html")]
pub struct ResetRequestTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub email: String,
}

#[derive(Template)]
#[template(path = "auth/reset_password.html")]
pub struct ResetPasswordTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub token: String,
}

#[derive(Template)]
#[template(path = "auth/change_password.html")]
pub struct ChangePasswordTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "auth/change_email.html")]
pub struct ChangeEmailTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub new_email: String,
}

// -- Request types --

#[derive(Deserialize, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: Option<u64>) -> String {
    match max_age_hours {
        Some(hours) => format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            name,
            token,
            hours * 3600
        ),
        None => format!("{}={}; HttpOnly; SameSite=Lax; Path=/", name, token),
    }
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

pub(crate) fn with_cookie(mut response: Response, cookie: &str) -> AppResult<Response> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// Only same-site paths are followed after login.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn login_action(next: Option<&str>) -> String {
    match safe_next(next) {
        Some(next) => {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("next", next)
                .finish();
            format!("/auth/login/?{}", query)
        }
        None => "/auth/login/".to_string(),
    }
}

pub(crate) fn link(state: &AppState, path: &str) -> String {
    format!("{}{}", state.config.base_url(), path)
}

pub(crate) fn send_confirmation(state: &AppState, user: &User) -> AppResult<()> {
    let token = state.tokens.issue(user.id, TokenPurpose::Confirm)?;
    let link = link(state, &format!("/auth/confirm/{}/", token));
    state.mailer.send_template(
        &user.email,
        "Welcome to EMB",
        &ConfirmEmail {
            username: &user.username,
            link: &link,
        },
    )
}

// -- Handlers --

pub async fn register_page(layout: Layout) -> Response {
    if let Some(user) = &layout.user {
        return flash::redirect(&profile_url(&user.username), "You already have an account.");
    }
    Html(RegisterTemplate {
        layout,
        errors: Vec::new(),
        username: String::new(),
        email: String::new(),
    })
    .into_response()
}

pub async fn register(
    State(state): State<AppState>,
    layout: Layout,
    Form(form): Form<RegistrationForm>,
) -> AppResult<Response> {
    if let Some(user) = &layout.user {
        return Ok(flash::redirect(
            &profile_url(&user.username),
            "You already have an account.",
        ));
    }

    let mut errors = match form.validate() {
        Ok(()) => Vec::new(),
        Err(e) => error_messages(&e),
    };
    if !checked(&form.terms_of_service) {
        errors.push("You must accept the Terms of Service.".to_string());
    }
    {
        let conn = state.db.get()?;
        if users::email_taken(&conn, &form.email)? {
            errors.push("Email already registered.".to_string());
        }
        if users::username_taken(&conn, &form.username)? {
            errors.push("Username already in use.".to_string());
        }
    }
    if !errors.is_empty() {
        return Ok(Html(RegisterTemplate {
            layout,
            errors,
            username: form.username,
            email: form.email,
        })
        .into_response());
    }

    let hash = hash_password_blocking(form.password, state.config.auth.bcrypt_cost).await?;
    let user = {
        let conn = state.db.get()?;
        users::create_user(
            &conn,
            &NewUser {
                username: &form.username,
                email: &form.email,
                password_hash: &hash,
                confirmed: false,
            },
            state.config.is_admin_email(&form.email),
        )?
    };
    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    send_confirmation(&state, &user)?;
    Ok(flash::redirect(
        "/auth/login/",
        "A confirmation email has been sent to your email address.",
    ))
}

pub async fn confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let profile = profile_url(&user.username);
    if user.confirmed {
        return Ok(flash::redirect(&profile, "Your account has already been confirmed."));
    }

    match state.tokens.verify_user(&token, TokenPurpose::Confirm) {
        Ok(id) if id == user.id => {
            let conn = state.db.get()?;
            users::confirm(&conn, user.id)?;
            tracing::info!(user_id = user.id, "Account confirmed");
            Ok(flash::redirect(&profile, "You have confirmed your account. Thank you!"))
        }
        _ => Ok(flash::redirect(
            &profile,
            "The confirmation link is invalid or has expired.",
        )),
    }
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    send_confirmation(&state, &user)?;
    Ok(flash::redirect(
        &profile_url(&user.username),
        "A new confirmation email has been sent to your email address.",
    ))
}

pub async fn unconfirmed(layout: Layout) -> Response {
    let target = match &layout.user {
        None => Some("/".to_string()),
        Some(user) if user.confirmed => Some(profile_url(&user.username)),
        Some(_) => None,
    };
    match target {
        Some(target) => Redirect::to(&target).into_response(),
        None => Html(UnconfirmedTemplate { layout }).into_response(),
    }
}

pub async fn login_page(layout: Layout, Query(query): Query<NextQuery>) -> Response {
    if let Some(user) = &layout.user {
        return flash::redirect(&profile_url(&user.username), "You are already logged in.");
    }
    Html(LoginTemplate {
        layout,
        errors: Vec::new(),
        email: String::new(),
        action: login_action(query.next.as_deref()),
    })
    .into_response()
}

pub async fn login(
    State(state): State<AppState>,
    layout: Layout,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    if let Some(user) = &layout.user {
        return Ok(flash::redirect(
            &profile_url(&user.username),
            "You are already logged in.",
        ));
    }
    let action = login_action(query.next.as_deref());

    if let Err(e) = form.validate() {
        return Ok(Html(LoginTemplate {
            layout,
            errors: error_messages(&e),
            email: form.email,
            action,
        })
        .into_response());
    }

    let user = {
        let conn = state.db.get()?;
        users::find_by_email(&conn, &form.email)?
    };
    let verified = match &user {
        Some(user) => verify_password_blocking(form.password, user.password_hash.clone()).await,
        None => false,
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::info!(email = %form.email, "Failed login attempt");
            return Ok(flash::redirect(&action, "Invalid email or password."));
        }
    };

    let remember = checked(&form.remember_me);
    let hours = if remember {
        state.config.auth.remember_days * 24
    } else {
        state.config.auth.session_hours
    };
    let token = {
        let conn = state.db.get()?;
        session::create_session(&conn, user.id, hours)?
    };
    tracing::info!(user_id = user.id, remember, "User logged in");

    let target = safe_next(query.next.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| profile_url(&user.username));
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        remember.then_some(hours),
    );
    with_cookie(Redirect::to(&target).into_response(), &cookie)
}

pub async fn logout(
    State(state): State<AppState>,
    _user: CurrentUser,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = cookie_value(&headers, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }
    with_cookie(
        flash::redirect("/", "You have been logged out."),
        &clear_session_cookie(cookie_name),
    )
}

pub async fn reset_password_request_page(layout: Layout) -> Response {
    if let Some(user) = &layout.user {
        return flash::redirect(
            &profile_url(&user.username),
            "You are already logged in. Please use \"Change Password\" instead.",
        );
    }
    Html(ResetRequestTemplate {
        layout,
        errors: Vec::new(),
        email: String::new(),
    })
    .into_response()
}

pub async fn reset_password_request(
    State(state): State<AppState>,
    layout: Layout,
    Form(form): Form<ResetPasswordRequestForm>,
) -> AppResult<Response> {
    if let Some(user) = &layout.user {
        return Ok(flash::redirect(
            &profile_url(&user.username),
            "You are already logged in. Please use \"Change Password\" instead.",
        ));
    }

    let errors = match form.validate() {
        Ok(()) => {
            let conn = state.db.get()?;
            match users::find_by_email(&conn, &form.email)? {
                Some(user) => {
                    let token = state.tokens.issue(user.id, TokenPurpose::ResetPassword)?;
                    let link = link(&state, &format!("/auth/reset_password/{}/", token));
                    state.mailer.send_template(
                        &user.email,
                        "Reset Your Password",
                        &ResetPasswordEmail {
                            username: &user.username,
                            link: &link,
                        },
                    )?;
                    return Ok(flash::redirect(
                        "/auth/login/",
                        "Check your email for the instructions to reset your password.",
                    ));
                }
                None => vec!["Email does not exist.".to_string()],
            }
        }
        Err(e) => error_messages(&e),
    };

    Ok(Html(ResetRequestTemplate {
        layout,
        errors,
        email: form.email,
    })
    .into_response())
}

/// User a reset token was issued to, if it is still valid.
fn reset_target(state: &AppState, token: &str) -> AppResult<Option<User>> {
    let Ok(user_id) = state.tokens.verify_user(token, TokenPurpose::ResetPassword) else {
        return Ok(None);
    };
    let conn = state.db.get()?;
    Ok(users::find_by_id(&conn, user_id)?)
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    layout: Layout,
    Path(token): Path<String>,
) -> AppResult<Response> {
    if layout.logged_in() {
        return Ok(Redirect::to("/").into_response());
    }
    if reset_target(&state, &token)?.is_none() {
        return Ok(flash::redirect(
            "/",
            "Reset token is invalid. You need to request a new one.",
        ));
    }
    Ok(Html(ResetPasswordTemplate {
        layout,
        errors: Vec::new(),
        token,
    })
    .into_response())
}

pub async fn reset_password(
    State(state): State<AppState>,
    layout: Layout,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Response> {
    if layout.logged_in() {
        return Ok(Redirect::to("/").into_response());
    }
    let Some(user) = reset_target(&state, &token)? else {
        return Ok(flash::redirect(
            "/",
            "Reset token is invalid. You need to request a new one.",
        ));
    };

    if let Err(e) = form.validate() {
        return Ok(Html(ResetPasswordTemplate {
            layout,
            errors: error_messages(&e),
            token,
        })
        .into_response());
    }

    let hash = hash_password_blocking(form.new_password, state.config.auth.bcrypt_cost).await?;
    let conn = state.db.get()?;
    users::set_password_hash(&conn, user.id, &hash)?;
    tracing::info!(user_id = user.id, "Password reset");
    Ok(flash::redirect("/auth/login/", "Your password has been reset."))
}

pub async fn change_password_page(_user: CurrentUser, layout: Layout) -> Response {
    Html(ChangePasswordTemplate {
        layout,
        errors: Vec::new(),
    })
    .into_response()
}

pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    layout: Layout,
    Form(form): Form<ChangePasswordForm>,
) -> AppResult<Response> {
    let errors = match form.validate() {
        Err(e) => error_messages(&e),
        Ok(()) => {
            if verify_password_blocking(form.old_password, user.password_hash.clone()).await {
                let hash =
                    hash_password_blocking(form.new_password, state.config.auth.bcrypt_cost).await?;
                let conn = state.db.get()?;
                users::set_password_hash(&conn, user.id, &hash)?;
                return Ok(flash::redirect(
                    &profile_url(&user.username),
                    "Your password has been updated.",
                ));
            }
            vec!["Invalid password.".to_string()]
        }
    };

    Ok(Html(ChangePasswordTemplate { layout, errors }).into_response())
}

pub async fn change_email_page(_user: CurrentUser, layout: Layout) -> Response {
    Html(ChangeEmailTemplate {
        layout,
        errors: Vec::new(),
        new_email: String::new(),
    })
    .into_response()
}

pub async fn change_email_request(
    State(state): State<AppState>,
    user: CurrentUser,
    layout: Layout,
    Form(form): Form<ChangeEmailForm>,
) -> AppResult<Response> {
    let new_email = form.new_email.trim().to_lowercase();
    let errors = match form.validate() {
        Err(e) => error_messages(&e),
        Ok(()) => {
            let taken = {
                let conn = state.db.get()?;
                users::email_taken(&conn, &new_email)?
            };
            if taken {
                vec!["Email already registered.".to_string()]
            } else if !verify_password_blocking(form.password, user.password_hash.clone()).await {
                vec!["Invalid email or password.".to_string()]
            } else {
                let token = state.tokens.issue_change_email(user.id, &new_email)?;
                let link = link(&state, &format!("/auth/change_email/{}/", token));
                state.mailer.send_template(
                    &new_email,
                    "Confirm your email address",
                    &ChangeEmailEmail {
                        username: &user.username,
                        link: &link,
                    },
                )?;
                return Ok(flash::redirect(
                    &profile_url(&user.username),
                    "An email with instructions to confirm your new email address has been sent to you.",
                ));
            }
        }
    };

    Ok(Html(ChangeEmailTemplate {
        layout,
        errors,
        new_email: form.new_email,
    })
    .into_response())
}

pub async fn change_email(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let profile = profile_url(&user.username);
    let claims = match state.tokens.verify(&token, TokenPurpose::ChangeEmail) {
        Ok(claims) if claims.sub == user.id => claims,
        _ => return Ok(flash::redirect(&profile, "Invalid request.")),
    };
    let Some(new_email) = claims.new_email else {
        return Ok(flash::redirect(&profile, "Invalid request."));
    };

    let conn = state.db.get()?;
    if users::email_taken(&conn, &new_email)? {
        return Ok(flash::redirect(&profile, "Invalid request."));
    }
    users::set_email(&conn, user.id, &new_email)?;
    tracing::info!(user_id = user.id, "Email address changed");
    Ok(flash::redirect(&profile, "Your email address has been updated."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next(Some("/post/posts/")), Some("/post/posts/"));
        assert_eq!(safe_next(Some("//evil.example/")), None);
        assert_eq!(safe_next(Some("https://evil.example/")), None);
        assert_eq!(safe_next(Some("/\\evil")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn login_action_keeps_next() {
        assert_eq!(login_action(None), "/auth/login/");
        assert_eq!(
            login_action(Some("/user/alice/")),
            "/auth/login/?next=%2Fuser%2Falice%2F"
        );
        assert_eq!(login_action(Some("http://x")), "/auth/login/");
    }

    #[test]
    fn session_cookie_persists_only_when_remembered() {
        assert_eq!(
            session_cookie("emb_session", "tok", None),
            "emb_session=tok; HttpOnly; SameSite=Lax; Path=/"
        );
        assert!(session_cookie("emb_session", "tok", Some(2)).ends_with("Max-Age=7200"));
        assert!(clear_session_cookie("emb_session").contains("Max-Age=0"));
    }
}
