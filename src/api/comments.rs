use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::auth::ApiUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::{api_url, page_links};
use crate::auth::forms::{error_messages, CommentForm};
use crate::db::models::Comment;
use crate::db::roles::Permission;
use crate::db::{comments, posts};
use crate::error::AppError;
use crate::pagination::{clamp_page, Pagination};
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CommentJson {
    pub url: String,
    pub post_url: String,
    /// `None` once a moderator has disabled the comment, like `raw_body`.
    pub body: Option<String>,
    pub raw_body: Option<String>,
    pub disabled: bool,
    pub timestamp: DateTime<Utc>,
    pub author_url: String,
}

impl CommentJson {
    pub fn new(state: &AppState, comment: &Comment) -> Self {
        Self {
            url: api_url(state, &format!("/comments/{}/", comment.id)),
            post_url: api_url(state, &format!("/posts/{}/", comment.post_id)),
            body: (!comment.disabled).then(|| comment.body.clone()),
            raw_body: (!comment.disabled).then(|| comment.raw_body.clone()),
            disabled: comment.disabled,
            timestamp: comment.timestamp,
            author_url: api_url(state, &format!("/users/{}/", comment.author_id)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentCollection {
    pub comments: Vec<CommentJson>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub count: i64,
}

impl CommentCollection {
    fn new(state: &AppState, path: &str, page: Pagination<Comment>) -> Self {
        let (prev, next) = page_links(state, path, &page);
        Self {
            count: page.total,
            comments: page.items.iter().map(|c| CommentJson::new(state, c)).collect(),
            prev,
            next,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewComment {
    #[serde(default)]
    pub raw_body: String,
}

pub async fn list(
    State(state): State<AppState>,
    _user: ApiUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<CommentCollection>> {
    let page = {
        let conn = state.db.get()?;
        comments::list_all(
            &conn,
            clamp_page(query.number()),
            state.config.pagination.comments_per_page,
        )?
    };
    Ok(Json(CommentCollection::new(&state, "/comments/", page)))
}

pub async fn get(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<CommentJson>> {
    let Path(id) = id?;
    let conn = state.db.get()?;
    let comment = comments::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(Json(CommentJson::new(&state, &comment)))
}

pub async fn list_for_post(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<CommentCollection>> {
    let Path(id) = id?;
    let page = {
        let conn = state.db.get()?;
        let post = posts::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
        comments::list_for_post(
            &conn,
            post.id,
            clamp_page(query.number()),
            state.config.pagination.comments_per_page,
        )?
    };
    Ok(Json(CommentCollection::new(
        &state,
        &format!("/posts/{}/comments/", id),
        page,
    )))
}

pub async fn create(
    State(state): State<AppState>,
    user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<NewComment>, JsonRejection>,
) -> ApiResult<Response> {
    let Path(id) = id?;
    user.require(Permission::COMMENT)?;
    let Json(payload) = payload?;
    let form = CommentForm {
        raw_body: payload.raw_body,
    };
    form.validate()
        .map_err(|e| ApiError::bad_request(&error_messages(&e).join(" ")))?;

    let comment = {
        let conn = state.db.get()?;
        let post = posts::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
        comments::create_comment(&conn, user.id, post.id, &form.raw_body)?
    };
    tracing::info!(comment_id = comment.id, post_id = id, author_id = user.id, "Comment added via API");

    let json = CommentJson::new(&state, &comment);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, json.url.clone())],
        Json(json),
    )
        .into_response())
}
