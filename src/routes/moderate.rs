use askama::Template;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::db::comments;
use crate::db::models::Comment;
use crate::db::roles::Permission;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::pagination::clamp_page;
use crate::routes::home::Html;
use crate::routes::layout::{Layout, Pager};
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "moderate/moderate.html")]
pub struct ModerateTemplate {
    pub layout: Layout,
    pub comments: Vec<Comment>,
    pub pager: Pager,
    /// Current page, carried into the enable/disable forms.
    pub page: u32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/moderate/", get(moderate))
        .route("/moderate/enable/{id}/", post(enable))
        .route("/moderate/disable/{id}/", post(disable))
}

pub async fn moderate(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    viewer.require(Permission::MODERATE)?;
    let page = {
        let conn = state.db.get()?;
        comments::list_all(
            &conn,
            clamp_page(query.number()),
            state.config.pagination.comments_per_page,
        )?
    };

    Ok(Html(ModerateTemplate {
        pager: Pager::new(&page, "/moderate/"),
        page: page.page,
        comments: page.items,
        layout,
    })
    .into_response())
}

fn set_disabled(
    state: &AppState,
    viewer: &CurrentUser,
    id: i64,
    disabled: bool,
    page: Option<i64>,
) -> AppResult<Response> {
    viewer.require(Permission::MODERATE)?;
    {
        let conn = state.db.get()?;
        comments::set_disabled(&conn, id, disabled)?;
    }
    tracing::info!(comment_id = id, moderator_id = viewer.id, disabled, "Comment moderated");
    Ok(Redirect::to(&format!("/moderate/?page={}", clamp_page(page))).into_response())
}

pub async fn enable(
    State(state): State<AppState>,
    viewer: CurrentUser,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let Path(id) = id?;
    set_disabled(&state, &viewer, id, false, query.number())
}

pub async fn disable(
    State(state): State<AppState>,
    viewer: CurrentUser,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let Path(id) = id?;
    set_disabled(&state, &viewer, id, true, query.number())
}
