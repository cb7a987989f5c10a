//! JSON API mounted at `/api/v1`. Every endpoint needs API credentials;
//! see [`auth::ApiUser`].

pub mod auth;
pub mod comments;
pub mod error;
pub mod posts;
pub mod users;

use axum::routing::{get, post};
use axum::Router;

use crate::pagination::Pagination;
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tokens/", post(auth::issue_token))
        .route("/posts/", get(posts::list).post(posts::create))
        .route("/posts/{id}/", get(posts::get).put(posts::update))
        .route(
            "/posts/{id}/comments/",
            get(comments::list_for_post).post(comments::create),
        )
        .route("/comments/", get(comments::list))
        .route("/comments/{id}/", get(comments::get))
        .route("/users/{id}/", get(users::get))
        .route("/users/{id}/posts/", get(users::posts))
        .route("/users/{id}/timeline/", get(users::timeline))
}

/// Absolute URL of an API path such as `/posts/1/`.
pub(crate) fn api_url(state: &AppState, path: &str) -> String {
    format!("{}{}{}", state.config.base_url(), API_PREFIX, path)
}

/// `prev` and `next` links of a paginated collection at `path`.
pub(crate) fn page_links<T>(
    state: &AppState,
    path: &str,
    page: &Pagination<T>,
) -> (Option<String>, Option<String>) {
    let link = |n: u32| api_url(state, &format!("{}?page={}", path, n));
    (page.prev_num().map(link), page.next_num().map(link))
}
