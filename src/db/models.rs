use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::roles::Permission;

pub const DEFAULT_PROFILE_IMAGE: &str = "default_profile_image.svg";
pub const DEFAULT_POST_IMAGE: &str = "default_post_image.svg";

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub default_role: bool,
    pub permissions: Permission,
}

impl Role {
    pub fn has_permission(&self, perm: Permission) -> bool {
        self.permissions.contains(perm)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub confirmed: bool,
    pub password_hash: String,
    pub profile_image: String,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub premium_account: bool,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    /// Permissions of the user's role; empty when no role is assigned.
    pub permissions: Permission,
}

impl User {
    pub fn can(&self, perm: Permission) -> bool {
        self.permissions.contains(perm)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMIN)
    }

    pub fn profile_image_url(&self) -> String {
        profile_image_url(&self.profile_image)
    }

    pub fn has_custom_profile_image(&self) -> bool {
        self.profile_image != DEFAULT_PROFILE_IMAGE
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn location_or_empty(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    pub fn about_me_or_empty(&self) -> &str {
        self.about_me.as_deref().unwrap_or("")
    }

    pub fn role_label(&self) -> &str {
        self.role_name.as_deref().unwrap_or("None")
    }
}

pub fn profile_image_url(image: &str) -> String {
    if image == DEFAULT_PROFILE_IMAGE {
        format!("/assets/images/{}", image)
    } else {
        format!("/uploads/profile-images/{}", image)
    }
}

pub fn post_image_url(image: &str) -> String {
    if image == DEFAULT_POST_IMAGE {
        format!("/assets/images/{}", image)
    } else {
        format!("/uploads/post-images/{}", image)
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub image: String,
    pub raw_body: String,
    /// Sanitized HTML derived from `raw_body`.
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: i64,
    pub author_username: String,
    pub comment_count: i64,
}

impl Post {
    pub fn image_url(&self) -> String {
        post_image_url(&self.image)
    }

    pub fn has_custom_image(&self) -> bool {
        self.image != DEFAULT_POST_IMAGE
    }

    /// Path of the HTML page for this post.
    pub fn page_url(&self) -> String {
        format!("/post/{}/{}/", self.author_username, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub raw_body: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub disabled: bool,
    pub author_id: i64,
    pub author_username: String,
    pub author_image: String,
    pub post_id: i64,
    pub post_author_username: String,
}

impl Comment {
    pub fn author_image_url(&self) -> String {
        profile_image_url(&self.author_image)
    }

    pub fn post_page_url(&self) -> String {
        format!("/post/{}/{}/", self.post_author_username, self.post_id)
    }
}

/// One row of a followers / following list.
#[derive(Debug, Clone)]
pub struct FollowEntry {
    pub user_id: i64,
    pub username: String,
    pub profile_image: String,
    pub timestamp: DateTime<Utc>,
}

impl FollowEntry {
    pub fn profile_image_url(&self) -> String {
        profile_image_url(&self.profile_image)
    }
}
