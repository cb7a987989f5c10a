use axum::routing::get;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/register/",
            get(handlers::register_page).post(handlers::register),
        )
        .route(
            "/auth/login/",
            get(handlers::login_page).post(handlers::login),
        )
        .route(
            "/auth/logout/",
            get(handlers::logout).post(handlers::logout),
        )
        .route("/auth/confirm/", get(handlers::resend_confirmation))
        .route("/auth/confirm/{token}/", get(handlers::confirm))
        .route("/auth/unconfirmed/", get(handlers::unconfirmed))
        .route(
            "/auth/reset_password_request/",
            get(handlers::reset_password_request_page).post(handlers::reset_password_request),
        )
        .route(
            "/auth/reset_password/{token}/",
            get(handlers::reset_password_page).post(handlers::reset_password),
        )
        .route(
            "/auth/change-password/",
            get(handlers::change_password_page).post(handlers::change_password),
        )
        .route(
            "/auth/change-email/",
            get(handlers::change_email_page).post(handlers::change_email_request),
        )
        .route("/auth/change_email/{token}/", get(handlers::change_email))
}
