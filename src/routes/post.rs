use askama::Template;
use axum::extract::rejection::PathRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::{DateTime, NaiveDateTime, Utc};
use validator::Validate;

use crate::auth::forms::{error_messages, CommentForm, PostForm};
use crate::auth::handlers::with_cookie;
use crate::db::models::{Comment, Post};
use crate::db::roles::Permission;
use crate::db::{comments, posts, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, CurrentUser};
use crate::flash;
use crate::images;
use crate::pagination::{clamp_page, last_page};
use crate::routes::home::Html;
use crate::routes::layout::{Layout, Pager};
use crate::routes::{profile_url, MultipartForm, PageQuery, Upload, UPLOAD_LIMIT};
use crate::state::AppState;

pub const SHOW_FOLLOWED_COOKIE: &str = "show_followed";
const SHOW_FOLLOWED_MAX_AGE: u64 = 30 * 24 * 60 * 60;

/// `datetime-local` input format.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Template)]
#[template(path = "post/create_post.html")]
pub struct CreatePostTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub action: String,
    pub title: String,
    pub raw_body: String,
}

#[derive(Template)]
#[template(path = "post/posts.html")]
pub struct PostsTemplate {
    pub layout: Layout,
    pub posts: Vec<Post>,
    pub pager: Pager,
    pub show_followed: bool,
}

#[derive(Template)]
#[template(path = "post/view_post.html")]
pub struct ViewPostTemplate {
    pub layout: Layout,
    pub post: Post,
    pub comments: Vec<Comment>,
    pub pager: Pager,
    pub can_edit: bool,
    pub errors: Vec<String>,
    pub comment_body: String,
}

#[derive(Template)]
#[template(path = "post/edit_post.html")]
pub struct EditPostTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    pub post: Post,
    pub title: String,
    pub raw_body: String,
    /// Shown to administrators only.
    pub admin_form: bool,
    pub timestamp: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post/posts/", get(list_posts))
        .route("/post/all/", get(show_all))
        .route("/post/followed/", get(show_followed))
        .route(
            "/post/{username}/create-post/",
            get(create_post_page)
                .post(create_post)
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/post/{username}/{post_id}/",
            get(view_post).post(add_comment),
        )
        .route(
            "/post/{username}/{post_id}/edit/",
            get(edit_post_page)
                .post(edit_post)
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Reject an upload by extension before anything is written.
fn check_post_image(upload: Option<&Upload>, errors: &mut Vec<String>) {
    if let Some(upload) = upload {
        if !images::is_allowed_post_image(&upload.file_name) {
            errors.push("Post images must be jpg, jpe, jpeg, png, gif or bmp files.".to_string());
        }
    }
}

/// Store `upload` as the image of `post_id`. Returns a message for the
/// user when the file is rejected; the post itself is kept.
async fn attach_image(state: &AppState, post_id: i64, upload: Upload) -> AppResult<Option<String>> {
    match images::save_post_image(
        state.config.uploads_path(),
        post_id,
        upload.file_name,
        upload.data,
    )
    .await
    {
        Ok(stored) => {
            let conn = state.db.get()?;
            posts::set_image(&conn, post_id, &stored)?;
            Ok(None)
        }
        Err(e @ (AppError::Validation(_) | AppError::Image(_))) => Ok(Some(format!(
            "The image was not saved: {}.",
            e.public_message()
        ))),
        Err(e) => Err(e),
    }
}

fn load_post(state: &AppState, username: &str, post_id: i64) -> AppResult<Post> {
    let conn = state.db.get()?;
    posts::find_by_author(&conn, username, post_id)?.ok_or(AppError::NotFound)
}

pub async fn create_post_page(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let author = {
        let conn = state.db.get()?;
        users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?
    };
    viewer.require_self_or_admin(author.id)?;
    if !viewer.can(Permission::WRITE) {
        return Ok(flash::redirect(
            &profile_url(&viewer.username),
            "You do not have the permission to write posts.",
        ));
    }

    Ok(Html(CreatePostTemplate {
        layout,
        errors: Vec::new(),
        action: format!("/post/{}/create-post/", author.username),
        title: String::new(),
        raw_body: String::new(),
    })
    .into_response())
}

/// Publish a post for `username`, optionally with an image. Administrators
/// may publish on behalf of another user.
pub async fn create_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Path(username): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let author = {
        let conn = state.db.get()?;
        users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?
    };
    viewer.require_self_or_admin(author.id)?;
    if !viewer.can(Permission::WRITE) {
        return Ok(flash::redirect(
            &profile_url(&viewer.username),
            "You do not have the permission to write posts.",
        ));
    }

    let mut multipart = MultipartForm::read(multipart).await?;
    let form = PostForm {
        title: multipart.text("title").trim().to_string(),
        raw_body: multipart.text("raw_body").to_string(),
    };
    let upload = multipart.take_file("image");

    let mut errors = match form.validate() {
        Ok(()) => Vec::new(),
        Err(e) => error_messages(&e),
    };
    check_post_image(upload.as_ref(), &mut errors);
    if !errors.is_empty() {
        return Ok(Html(CreatePostTemplate {
            layout,
            errors,
            action: format!("/post/{}/create-post/", author.username),
            title: form.title,
            raw_body: form.raw_body,
        })
        .into_response());
    }

    let post = {
        let conn = state.db.get()?;
        posts::create_post(&conn, author.id, &form.title, &form.raw_body)?
    };
    tracing::info!(post_id = post.id, author_id = author.id, "Post created");

    let mut messages = vec!["Your post has been published.".to_string()];
    if let Some(upload) = upload {
        messages.extend(attach_image(&state, post.id, upload).await?);
    }
    let messages: Vec<&str> = messages.iter().map(String::as_str).collect();
    Ok(flash::redirect_with(&profile_url(&author.username), &messages))
}

/// All posts, or the viewer's timeline when the `show_followed` cookie is set.
pub async fn list_posts(
    State(state): State<AppState>,
    layout: Layout,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let show_followed =
        layout.logged_in() && cookie_value(&headers, SHOW_FOLLOWED_COOKIE).is_some();
    let page = clamp_page(query.number());
    let per_page = state.config.pagination.posts_per_page;

    let page = {
        let conn = state.db.get()?;
        match &layout.user {
            Some(user) if show_followed => posts::timeline(&conn, user.id, page, per_page)?,
            _ => posts::list_all(&conn, page, per_page)?,
        }
    };

    Ok(Html(PostsTemplate {
        pager: Pager::new(&page, "/post/posts/"),
        posts: page.items,
        show_followed,
        layout,
    })
    .into_response())
}

fn show_followed_cookie(value: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SHOW_FOLLOWED_COOKIE, value, SHOW_FOLLOWED_MAX_AGE
    )
}

pub async fn show_all(_viewer: CurrentUser) -> AppResult<Response> {
    with_cookie(
        Redirect::to("/post/posts/").into_response(),
        &show_followed_cookie(""),
    )
}

pub async fn show_followed(_viewer: CurrentUser) -> AppResult<Response> {
    with_cookie(
        Redirect::to("/post/posts/").into_response(),
        &show_followed_cookie("1"),
    )
}

fn render_post(
    state: &AppState,
    layout: Layout,
    post: Post,
    page: Option<i64>,
    errors: Vec<String>,
    comment_body: String,
) -> AppResult<Response> {
    let per_page = state.config.pagination.comments_per_page;
    let page = {
        let conn = state.db.get()?;
        let page = match page {
            Some(-1) => last_page(comments::count_for_post(&conn, post.id)?, per_page),
            other => clamp_page(other),
        };
        comments::list_for_post(&conn, post.id, page, per_page)?
    };

    Ok(Html(ViewPostTemplate {
        pager: Pager::new(&page, &post.page_url()),
        comments: page.items,
        can_edit: layout.is_user(post.author_id) || layout.is_admin(),
        errors,
        comment_body,
        post,
        layout,
    })
    .into_response())
}

pub async fn view_post(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    layout: Layout,
    path: Result<Path<(String, i64)>, PathRejection>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let Path((username, post_id)) = path?;
    let post = load_post(&state, &username, post_id)?;
    render_post(&state, layout, post, query.number(), Vec::new(), String::new())
}

pub async fn add_comment(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    path: Result<Path<(String, i64)>, PathRejection>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let Path((username, post_id)) = path?;
    viewer.require(Permission::COMMENT)?;
    let post = load_post(&state, &username, post_id)?;

    if let Err(e) = form.validate() {
        return render_post(&state, layout, post, None, error_messages(&e), form.raw_body);
    }

    let comment = {
        let conn = state.db.get()?;
        comments::create_comment(&conn, viewer.id, post.id, &form.raw_body)?
    };
    tracing::info!(comment_id = comment.id, post_id = post.id, author_id = viewer.id, "Comment added");
    Ok(flash::redirect(&post.page_url(), "Your comment has been published."))
}

pub async fn edit_post_page(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> AppResult<Response> {
    let Path((username, post_id)) = path?;
    let post = load_post(&state, &username, post_id)?;
    viewer.require_self_or_admin(post.author_id)?;

    Ok(Html(EditPostTemplate {
        layout,
        errors: Vec::new(),
        title: post.title.clone(),
        raw_body: post.raw_body.clone(),
        admin_form: viewer.is_administrator(),
        timestamp: post.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        post,
    })
    .into_response())
}

/// Update title and body, optionally the image. Administrators may also
/// move the post's timestamp.
pub async fn edit_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    path: Result<Path<(String, i64)>, PathRejection>,
    multipart: Multipart,
) -> AppResult<Response> {
    let Path((username, post_id)) = path?;
    let post = load_post(&state, &username, post_id)?;
    viewer.require_self_or_admin(post.author_id)?;
    let admin_form = viewer.is_administrator();

    let mut multipart = MultipartForm::read(multipart).await?;
    let form = PostForm {
        title: multipart.text("title").trim().to_string(),
        raw_body: multipart.text("raw_body").to_string(),
    };
    let timestamp_field = multipart.text("timestamp").to_string();
    let upload = multipart.take_file("image");

    let mut errors = match form.validate() {
        Ok(()) => Vec::new(),
        Err(e) => error_messages(&e),
    };
    check_post_image(upload.as_ref(), &mut errors);
    let timestamp = if admin_form && !timestamp_field.trim().is_empty() {
        let parsed = parse_timestamp(&timestamp_field);
        if parsed.is_none() {
            errors.push("Timestamp must look like 2024-01-31T18:30.".to_string());
        }
        parsed
    } else {
        None
    };

    if !errors.is_empty() {
        return Ok(Html(EditPostTemplate {
            layout,
            errors,
            title: form.title,
            raw_body: form.raw_body,
            admin_form,
            timestamp: timestamp_field,
            post,
        })
        .into_response());
    }

    {
        let conn = state.db.get()?;
        posts::update_post(&conn, post.id, &form.title, &form.raw_body)?;
        if let Some(timestamp) = timestamp {
            posts::set_timestamp(&conn, post.id, timestamp)?;
        }
    }
    tracing::info!(post_id = post.id, editor_id = viewer.id, "Post updated");

    let mut messages = vec!["The post has been updated.".to_string()];
    if let Some(upload) = upload {
        messages.extend(attach_image(&state, post.id, upload).await?);
    }
    let messages: Vec<&str> = messages.iter().map(String::as_str).collect();
    Ok(flash::redirect_with(&post.page_url(), &messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_datetime_local_values() {
        let ts = parse_timestamp("2024-01-31T18:30").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 31));
        assert_eq!((ts.hour(), ts.minute()), (18, 30));

        assert!(parse_timestamp("2024-01-31T18:30:15").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn rejects_unlisted_image_extensions() {
        let mut errors = Vec::new();
        let svg = Upload {
            file_name: "drawing.svg".into(),
            data: vec![1, 2, 3],
        };
        check_post_image(Some(&svg), &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        let png = Upload {
            file_name: "photo.PNG".into(),
            data: vec![1, 2, 3],
        };
        check_post_image(Some(&png), &mut errors);
        check_post_image(None, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn show_followed_cookie_lasts_thirty_days() {
        let cookie = show_followed_cookie("1");
        assert!(cookie.starts_with("show_followed=1;"));
        assert!(cookie.contains("Max-Age=2592000"));
    }
}
