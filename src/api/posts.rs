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
use crate::auth::forms::{error_messages, PostForm};
use crate::db::models::Post;
use crate::db::posts;
use crate::db::roles::Permission;
use crate::error::AppError;
use crate::pagination::{clamp_page, Pagination};
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PostJson {
    pub url: String,
    pub title: String,
    pub raw_body: String,
    pub body: String,
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
    pub author_url: String,
    pub comments_url: String,
    pub comment_count: i64,
}

impl PostJson {
    pub fn new(state: &AppState, post: &Post) -> Self {
        Self {
            url: api_url(state, &format!("/posts/{}/", post.id)),
            title: post.title.clone(),
            raw_body: post.raw_body.clone(),
            body: post.body.clone(),
            image_url: format!("{}{}", state.config.base_url(), post.image_url()),
            timestamp: post.timestamp,
            author_url: api_url(state, &format!("/users/{}/", post.author_id)),
            comments_url: api_url(state, &format!("/posts/{}/comments/", post.id)),
            comment_count: post.comment_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostCollection {
    pub posts: Vec<PostJson>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub count: i64,
}

impl PostCollection {
    /// Wrap one page of posts listed at the API path `path`.
    pub fn new(state: &AppState, path: &str, page: Pagination<Post>) -> Self {
        let (prev, next) = page_links(state, path, &page);
        Self {
            count: page.total,
            posts: page.items.iter().map(|p| PostJson::new(state, p)).collect(),
            prev,
            next,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub raw_body: String,
}

#[derive(Debug, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub raw_body: Option<String>,
}

fn validated(title: String, raw_body: String) -> ApiResult<PostForm> {
    let form = PostForm {
        title: title.trim().to_string(),
        raw_body,
    };
    form.validate()
        .map_err(|e| ApiError::bad_request(&error_messages(&e).join(" ")))?;
    Ok(form)
}

pub async fn list(
    State(state): State<AppState>,
    _user: ApiUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PostCollection>> {
    let page = {
        let conn = state.db.get()?;
        posts::list_all(
            &conn,
            clamp_page(query.number()),
            state.config.pagination.posts_per_page,
        )?
    };
    Ok(Json(PostCollection::new(&state, "/posts/", page)))
}

pub async fn get(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<PostJson>> {
    let Path(id) = id?;
    let conn = state.db.get()?;
    let post = posts::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(Json(PostJson::new(&state, &post)))
}

/// Publish a post as the authenticated user. Responds 201 with the post's
/// URL in `Location`.
pub async fn create(
    State(state): State<AppState>,
    user: ApiUser,
    payload: Result<Json<NewPost>, JsonRejection>,
) -> ApiResult<Response> {
    user.require(Permission::WRITE)?;
    let Json(payload) = payload?;
    let form = validated(payload.title, payload.raw_body)?;

    let post = {
        let conn = state.db.get()?;
        posts::create_post(&conn, user.id, &form.title, &form.raw_body)?
    };
    tracing::info!(post_id = post.id, author_id = user.id, "Post created via API");

    let json = PostJson::new(&state, &post);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, json.url.clone())],
        Json(json),
    )
        .into_response())
}

/// Change title and/or body. The stored HTML is derived again from the new
/// raw body.
pub async fn update(
    State(state): State<AppState>,
    user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PostUpdate>, JsonRejection>,
) -> ApiResult<Json<PostJson>> {
    let Path(id) = id?;
    user.require(Permission::WRITE)?;
    let Json(payload) = payload?;

    let post = {
        let conn = state.db.get()?;
        posts::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?
    };
    if post.author_id != user.id && !user.can(Permission::ADMIN) {
        return Err(ApiError::forbidden("Insufficient permissions"));
    }

    let form = validated(
        payload.title.unwrap_or(post.title),
        payload.raw_body.unwrap_or(post.raw_body),
    )?;
    let post = {
        let conn = state.db.get()?;
        posts::update_post(&conn, id, &form.title, &form.raw_body)?;
        posts::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?
    };
    tracing::info!(post_id = id, editor_id = user.id, "Post updated via API");
    Ok(Json(PostJson::new(&state, &post)))
}
