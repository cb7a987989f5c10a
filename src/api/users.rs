use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::api_url;
use crate::api::auth::ApiUser;
use crate::api::error::ApiResult;
use crate::api::posts::PostCollection;
use crate::db::models::User;
use crate::db::{posts, users};
use crate::error::AppError;
use crate::pagination::clamp_page;
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserJson {
    pub url: String,
    pub username: String,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub posts_url: String,
    pub followed_posts_url: String,
    pub post_count: i64,
}

impl UserJson {
    pub fn new(state: &AppState, user: &User, post_count: i64) -> Self {
        Self {
            url: api_url(state, &format!("/users/{}/", user.id)),
            username: user.username.clone(),
            member_since: user.member_since,
            last_seen: user.last_seen,
            posts_url: api_url(state, &format!("/users/{}/posts/", user.id)),
            followed_posts_url: api_url(state, &format!("/users/{}/timeline/", user.id)),
            post_count,
        }
    }
}

fn find_user(state: &AppState, id: i64) -> ApiResult<User> {
    let conn = state.db.get()?;
    Ok(users::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?)
}

pub async fn get(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<UserJson>> {
    let Path(id) = id?;
    let conn = state.db.get()?;
    let user = users::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    let post_count = users::post_count(&conn, user.id)?;
    Ok(Json(UserJson::new(&state, &user, post_count)))
}

/// Posts written by the user, newest first.
pub async fn posts(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PostCollection>> {
    let Path(id) = id?;
    let user = find_user(&state, id)?;
    let page = {
        let conn = state.db.get()?;
        posts::list_by_author(
            &conn,
            user.id,
            clamp_page(query.number()),
            state.config.pagination.posts_per_page,
        )?
    };
    Ok(Json(PostCollection::new(
        &state,
        &format!("/users/{}/posts/", id),
        page,
    )))
}

/// Posts by everyone the user follows, their own included.
pub async fn timeline(
    State(state): State<AppState>,
    _user: ApiUser,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PostCollection>> {
    let Path(id) = id?;
    let user = find_user(&state, id)?;
    let page = {
        let conn = state.db.get()?;
        posts::timeline(
            &conn,
            user.id,
            clamp_page(query.number()),
            state.config.pagination.posts_per_page,
        )?
    };
    Ok(Json(PostCollection::new(
        &state,
        &format!("/users/{}/timeline/", id),
        page,
    )))
}
