//! Premium accounts. There is no payment provider; administrators grant or
//! revoke the premium flag by hand.

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::db::roles::Permission;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash;
use crate::routes::home::Html;
use crate::routes::layout::Layout;
use crate::routes::profile_url;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "payment/index.html")]
pub struct PaymentTemplate {
    pub layout: Layout,
    pub premium: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payment/", get(index))
        .route("/payment/{username}/grant/", post(grant))
        .route("/payment/{username}/revoke/", post(revoke))
}

pub async fn index(viewer: CurrentUser, layout: Layout) -> Response {
    Html(PaymentTemplate {
        layout,
        premium: viewer.premium_account,
    })
    .into_response()
}

fn set_premium(state: &AppState, viewer: &CurrentUser, username: &str, premium: bool) -> AppResult<Response> {
    viewer.require(Permission::ADMIN)?;
    let user = {
        let conn = state.db.get()?;
        let user = users::find_by_username(&conn, username)?.ok_or(AppError::NotFound)?;
        users::set_premium(&conn, user.id, premium)?;
        user
    };
    tracing::info!(user_id = user.id, admin_id = viewer.id, premium, "Premium status changed");

    let message = if premium {
        format!("{} now has a premium account.", user.username)
    } else {
        format!("{} no longer has a premium account.", user.username)
    };
    Ok(flash::redirect(&profile_url(&user.username), &message))
}

pub async fn grant(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Response> {
    set_premium(&state, &viewer, &username, true)
}

pub async fn revoke(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Response> {
    set_premium(&state, &viewer, &username, false)
}
