//! Data every rendered page shares: the viewer and pending flash messages.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::models::User;
use crate::db::roles::Permission;
use crate::extractors::MaybeUser;
use crate::flash::Flashes;
use crate::pagination::Pagination;

pub struct Layout {
    pub user: Option<User>,
    pub flashes: Vec<String>,
}

impl Layout {
    pub fn logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn username(&self) -> &str {
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("")
    }

    pub fn profile_image_url(&self) -> String {
        self.user
            .as_ref()
            .map(|u| u.profile_image_url())
            .unwrap_or_default()
    }

    pub fn can(&self, perm: Permission) -> bool {
        self.user.as_ref().is_some_and(|u| u.can(perm))
    }

    pub fn can_follow(&self) -> bool {
        self.can(Permission::FOLLOW)
    }

    pub fn can_comment(&self) -> bool {
        self.can(Permission::COMMENT)
    }

    pub fn can_write(&self) -> bool {
        self.can(Permission::WRITE)
    }

    pub fn can_moderate(&self) -> bool {
        self.can(Permission::MODERATE)
    }

    pub fn is_admin(&self) -> bool {
        self.can(Permission::ADMIN)
    }

    pub fn is_user(&self, user_id: i64) -> bool {
        self.user.as_ref().is_some_and(|u| u.id == user_id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Layout {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        let Flashes(flashes) = Flashes::from_request_parts(parts, state).await?;
        Ok(Layout {
            user: user.map(|u| u.0),
            flashes,
        })
    }
}

pub struct PageLink {
    /// `None` renders as an ellipsis.
    pub num: Option<u32>,
    pub href: String,
    pub current: bool,
}

/// Page links for a paginated listing at `base` (a path without query).
pub struct Pager {
    pub links: Vec<PageLink>,
    pub prev_href: Option<String>,
    pub next_href: Option<String>,
}

impl Pager {
    pub fn new<T>(pagination: &Pagination<T>, base: &str) -> Self {
        let href = |n: u32| format!("{}?page={}", base, n);
        Pager {
            links: pagination
                .iter_pages()
                .into_iter()
                .map(|num| PageLink {
                    num,
                    href: num.map(href).unwrap_or_default(),
                    current: num == Some(pagination.page),
                })
                .collect(),
            prev_href: pagination.prev_num().map(href),
            next_href: pagination.next_num().map(href),
        }
    }

    /// Only worth rendering when there is more than one page.
    pub fn visible(&self) -> bool {
        self.links.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pager_builds_hrefs_and_marks_current() {
        let p: Pagination<()> = Pagination {
            items: Vec::new(),
            page: 2,
            per_page: 10,
            total: 35,
        };
        let pager = Pager::new(&p, "/post/posts/");
        assert_eq!(pager.links.len(), 4);
        assert!(pager.links[1].current);
        assert_eq!(pager.links[3].href, "/post/posts/?page=4");
        assert_eq!(pager.prev_href.as_deref(), Some("/post/posts/?page=1"));
        assert_eq!(pager.next_href.as_deref(), Some("/post/posts/?page=3"));
        assert!(pager.visible());
    }

    #[test]
    fn layout_permissions_for_anonymous() {
        let layout = Layout {
            user: None,
            flashes: Vec::new(),
        };
        assert!(!layout.logged_in());
        assert!(!layout.can_write());
        assert_eq!(layout.username(), "");
    }
}
