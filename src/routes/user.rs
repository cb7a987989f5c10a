use askama::Template;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use validator::Validate;

use crate::auth::forms::{checked, error_messages, non_empty, EditProfileAdminForm};
use crate::auth::password::hash_password_blocking;
use crate::db::models::{FollowEntry, Post, Role, User, DEFAULT_PROFILE_IMAGE};
use crate::db::roles::{self, Permission};
use crate::db::users::{self, AdminUpdate, ProfileUpdate};
use crate::db::{follows, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash;
use crate::images::{self, PROFILE_IMAGE_DIR};
use crate::pagination::clamp_page;
use crate::routes::home::Html;
use crate::routes::layout::{Layout, Pager};
use crate::routes::{profile_url, MultipartForm, PageQuery, UPLOAD_LIMIT};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "user/profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub user: User,
    pub posts: Vec<Post>,
    pub pager: Pager,
    pub post_count: i64,
    pub follower_count: i64,
    pub followed_count: i64,
    pub is_self: bool,
    pub can_edit: bool,
    pub is_following: bool,
    pub follows_you: bool,
}

pub struct RoleOption {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "user/edit_profile.html")]
pub struct EditProfileTemplate {
    pub layout: Layout,
    pub errors: Vec<String>,
    /// Form action; the username before any edit.
    pub action: String,
    pub admin_form: bool,
    pub name: String,
    pub username: String,
    pub location: String,
    pub about_me: String,
    pub email: String,
    pub confirmed: bool,
    pub roles: Vec<RoleOption>,
}

#[derive(Template)]
#[template(path = "user/follows.html")]
pub struct FollowsTemplate {
    pub layout: Layout,
    pub title: String,
    pub user: User,
    pub entries: Vec<FollowEntry>,
    pub pager: Pager,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/user/{username}/",
            get(profile)
                .post(update_profile_image)
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/user/{username}/edit-profile/",
            get(edit_profile_page).post(edit_profile),
        )
        .route("/user/follow/{username}/", post(follow))
        .route("/user/unfollow/{username}/", post(unfollow))
        .route("/user/followers/{username}/", get(followers))
        .route("/user/followed_by/{username}/", get(followed_by))
}

fn role_options(roles: &[Role], selected: Option<i64>) -> Vec<RoleOption> {
    roles
        .iter()
        .map(|r| RoleOption {
            id: r.id,
            name: r.name.clone(),
            selected: Some(r.id) == selected,
        })
        .collect()
}

fn find_user(state: &AppState, username: &str) -> AppResult<User> {
    let conn = state.db.get()?;
    users::find_by_username(&conn, username)?.ok_or(AppError::NotFound)
}

pub async fn profile(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    let page = posts::list_by_author(
        &conn,
        user.id,
        clamp_page(query.number()),
        state.config.pagination.posts_per_page,
    )?;

    let template = ProfileTemplate {
        pager: Pager::new(&page, &profile_url(&user.username)),
        posts: page.items,
        post_count: page.total,
        follower_count: follows::follower_count(&conn, user.id)?,
        followed_count: follows::followed_count(&conn, user.id)?,
        is_self: viewer.id == user.id,
        can_edit: viewer.id == user.id || viewer.is_administrator(),
        is_following: follows::is_following(&conn, viewer.id, user.id)?,
        follows_you: viewer.id != user.id && follows::is_followed_by(&conn, viewer.id, user.id)?,
        user,
        layout,
    };
    Ok(Html(template).into_response())
}

/// Replace or reset a profile image. Owner or administrator only.
pub async fn update_profile_image(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(username): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let user = find_user(&state, &username)?;
    viewer.require_self_or_admin(user.id)?;

    let mut form = MultipartForm::read(multipart).await?;
    let profile = profile_url(&user.username);
    let uploads = state.config.uploads_path();

    if form.checked("reset_profile_image") {
        if !user.has_custom_profile_image() {
            return Ok(flash::redirect(
                &profile,
                "The profile image is already the default image.",
            ));
        }
        images::remove_upload(&uploads, PROFILE_IMAGE_DIR, &user.profile_image).await?;
        let conn = state.db.get()?;
        users::set_profile_image(&conn, user.id, DEFAULT_PROFILE_IMAGE)?;
        tracing::info!(user_id = user.id, "Profile image reset");
        return Ok(flash::redirect(&profile, "The profile image has been reset."));
    }

    let Some(upload) = form.take_file("new_profile_image") else {
        return Ok(flash::redirect(&profile, "Choose an image to upload."));
    };
    match images::save_profile_image(uploads, user.id, upload.file_name, upload.data).await {
        Ok(stored) => {
            let conn = state.db.get()?;
            users::set_profile_image(&conn, user.id, &stored)?;
            tracing::info!(user_id = user.id, image = %stored, "Profile image updated");
            Ok(flash::redirect(&profile, "The profile image has been updated."))
        }
        Err(e @ (AppError::Validation(_) | AppError::Image(_))) => {
            Ok(flash::redirect(&profile, &e.public_message()))
        }
        Err(e) => Err(e),
    }
}

pub async fn edit_profile_page(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let admin_form = viewer.is_administrator();
    let (user, roles) = {
        let conn = state.db.get()?;
        let user = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
        let roles = if admin_form {
            roles::list_roles(&conn)?
        } else {
            Vec::new()
        };
        (user, roles)
    };
    viewer.require_self_or_admin(user.id)?;

    Ok(Html(EditProfileTemplate {
        layout,
        errors: Vec::new(),
        action: format!("{}edit-profile/", profile_url(&user.username)),
        admin_form,
        name: user.name_or_empty().to_string(),
        username: user.username.clone(),
        location: user.location_or_empty().to_string(),
        about_me: user.about_me_or_empty().to_string(),
        email: user.email.clone(),
        confirmed: user.confirmed,
        roles: role_options(&roles, user.role_id),
    })
    .into_response())
}

/// Save the profile form. Administrators post the extended form with
/// email, confirmation, password and role.
pub async fn edit_profile(
    State(state): State<AppState>,
    viewer: CurrentUser,
    layout: Layout,
    Path(username): Path<String>,
    Form(form): Form<EditProfileAdminForm>,
) -> AppResult<Response> {
    let user = find_user(&state, &username)?;
    viewer.require_self_or_admin(user.id)?;
    let admin_form = viewer.is_administrator();

    let validation = if admin_form {
        form.validate()
    } else {
        form.profile().validate()
    };
    let mut errors = match validation {
        Ok(()) => Vec::new(),
        Err(e) => error_messages(&e),
    };

    let (roles, role) = {
        let conn = state.db.get()?;
        if form.username != user.username && users::username_taken(&conn, &form.username)? {
            errors.push("Username already in use.".to_string());
        }
        if admin_form {
            if !form.email.eq_ignore_ascii_case(&user.email) && users::email_taken(&conn, &form.email)? {
                errors.push("Email already registered.".to_string());
            }
            let role = match form.role {
                Some(id) => roles::find_by_id(&conn, id)?,
                None => None,
            };
            if role.is_none() {
                errors.push("Choose a valid role.".to_string());
            }
            (roles::list_roles(&conn)?, role)
        } else {
            (Vec::new(), None)
        }
    };

    if !errors.is_empty() {
        return Ok(Html(EditProfileTemplate {
            layout,
            errors,
            action: format!("{}edit-profile/", profile_url(&user.username)),
            admin_form,
            roles: role_options(&roles, form.role),
            confirmed: checked(&form.confirmed),
            name: form.name,
            username: form.username,
            location: form.location,
            about_me: form.about_me,
            email: form.email,
        })
        .into_response());
    }

    let password_hash = if admin_form && !form.new_password.is_empty() {
        Some(hash_password_blocking(form.new_password.clone(), state.config.auth.bcrypt_cost).await?)
    } else {
        None
    };

    {
        let conn = state.db.get()?;
        users::update_profile(
            &conn,
            user.id,
            &ProfileUpdate {
                name: non_empty(&form.name),
                username: &form.username,
                location: non_empty(&form.location),
                about_me: non_empty(&form.about_me),
            },
        )?;
        if let Some(role) = &role {
            users::update_admin_fields(
                &conn,
                user.id,
                &AdminUpdate {
                    email: form.email.trim(),
                    confirmed: checked(&form.confirmed),
                    role_id: role.id,
                    password_hash: password_hash.as_deref(),
                },
            )?;
        }
    }
    tracing::info!(
        user_id = user.id,
        editor_id = viewer.id,
        admin = admin_form,
        "Profile updated"
    );

    Ok(flash::redirect(
        &profile_url(&form.username),
        "The profile has been updated.",
    ))
}

pub async fn follow(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Response> {
    viewer.require(Permission::FOLLOW)?;
    let conn = state.db.get()?;
    let Some(user) = users::find_by_username(&conn, &username)? else {
        return Ok(flash::redirect("/", "Invalid user."));
    };
    let profile = profile_url(&user.username);

    if user.id == viewer.id {
        return Ok(flash::redirect(&profile, "You cannot follow yourself."));
    }
    if follows::is_following(&conn, viewer.id, user.id)? {
        return Ok(flash::redirect(
            &profile,
            &format!("You are already following {}.", user.username),
        ));
    }
    follows::follow(&conn, viewer.id, user.id)?;
    tracing::debug!(follower = viewer.id, followed = user.id, "Follow");
    Ok(flash::redirect(
        &profile,
        &format!("You are now following {}.", user.username),
    ))
}

pub async fn unfollow(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Response> {
    viewer.require(Permission::FOLLOW)?;
    let conn = state.db.get()?;
    let Some(user) = users::find_by_username(&conn, &username)? else {
        return Ok(flash::redirect("/", "Invalid user."));
    };
    let profile = profile_url(&user.username);

    if !follows::unfollow(&conn, viewer.id, user.id)? {
        return Ok(flash::redirect(
            &profile,
            &format!("You are not following {}.", user.username),
        ));
    }
    tracing::debug!(follower = viewer.id, followed = user.id, "Unfollow");
    Ok(flash::redirect(
        &profile,
        &format!("You are not following {} anymore.", user.username),
    ))
}

pub async fn followers(
    State(state): State<AppState>,
    layout: Layout,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let Some(user) = users::find_by_username(&conn, &username)? else {
        return Ok(flash::redirect("/", "Invalid user."));
    };
    let page = follows::followers(
        &conn,
        user.id,
        clamp_page(query.number()),
        state.config.pagination.followers_per_page,
    )?;

    Ok(Html(FollowsTemplate {
        layout,
        title: format!("Followers of {}", user.username),
        pager: Pager::new(&page, &format!("/user/followers/{}/", user.username)),
        entries: page.items,
        user,
    })
    .into_response())
}

pub async fn followed_by(
    State(state): State<AppState>,
    layout: Layout,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let Some(user) = users::find_by_username(&conn, &username)? else {
        return Ok(flash::redirect("/", "Invalid user."));
    };
    let page = follows::followed(
        &conn,
        user.id,
        clamp_page(query.number()),
        state.config.pagination.followers_per_page,
    )?;

    Ok(Html(FollowsTemplate {
        layout,
        title: format!("Followed by {}", user.username),
        pager: Pager::new(&page, &format!("/user/followed_by/{}/", user.username)),
        entries: page.items,
        user,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_options_mark_selected() {
        let roles = vec![
            Role {
                id: 1,
                name: "Administrator".into(),
                default_role: false,
                permissions: Permission::from_bits(31),
            },
            Role {
                id: 3,
                name: "User".into(),
                default_role: true,
                permissions: Permission::from_bits(7),
            },
        ];
        let options = role_options(&roles, Some(3));
        assert!(!options[0].selected);
        assert!(options[1].selected);
        assert_eq!(options[1].name, "User");

        assert!(role_options(&roles, None).iter().all(|o| !o.selected));
    }
}
