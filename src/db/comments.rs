use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::pagination::{fetch_page, Pagination};
use crate::sanitize::clean_comment_body;

const COMMENT_SELECT: &str = "SELECT c.id, c.raw_body, c.body, c.timestamp, c.disabled, \
     c.author_id, a.username, a.profile_image, c.post_id, pa.username \
     FROM comments c \
     JOIN users a ON a.id = c.author_id \
     JOIN posts p ON p.id = c.post_id \
     JOIN users pa ON pa.id = p.author_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        raw_body: row.get(1)?,
        body: row.get(2)?,
        timestamp: row.get(3)?,
        disabled: row.get(4)?,
        author_id: row.get(5)?,
        author_username: row.get(6)?,
        author_image: row.get(7)?,
        post_id: row.get(8)?,
        post_author_username: row.get(9)?,
    })
}

pub fn create_comment(
    conn: &Connection,
    author_id: i64,
    post_id: i64,
    raw_body: &str,
) -> rusqlite::Result<Comment> {
    conn.execute(
        "INSERT INTO comments (raw_body, body, timestamp, disabled, author_id, post_id)
         VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        params![raw_body, clean_comment_body(raw_body), Utc::now(), author_id, post_id],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Comment>> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    conn.query_row(&sql, params![id], comment_from_row).optional()
}

pub fn count_for_post(conn: &Connection, post_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}

/// Comments on one post, newest first.
pub fn list_for_post(
    conn: &Connection,
    post_id: i64,
    page: u32,
    per_page: u32,
) -> rusqlite::Result<Pagination<Comment>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM comments WHERE post_id = ?",
        &format!(
            "{} WHERE c.post_id = ? ORDER BY c.timestamp DESC, c.id DESC",
            COMMENT_SELECT
        ),
        &[&post_id],
        page,
        per_page,
        comment_from_row,
    )
}

/// Every comment on the site, newest first. Used by moderation.
pub fn list_all(conn: &Connection, page: u32, per_page: u32) -> rusqlite::Result<Pagination<Comment>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM comments",
        &format!("{} ORDER BY c.timestamp DESC, c.id DESC", COMMENT_SELECT),
        &[],
        page,
        per_page,
        comment_from_row,
    )
}

pub fn set_disabled(conn: &Connection, id: i64, disabled: bool) -> rusqlite::Result<()> {
    let changed = conn.execute(
        "UPDATE comments SET disabled = ?1 WHERE id = ?2",
        params![disabled, id],
    )?;
    if changed == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::posts;
    use crate::db::test_pool;
    use crate::db::users::tests::insert_user;

    #[test]
    fn create_comment_sanitizes_and_joins_names() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        let post = posts::create_post(&conn, alice.id, "t", "b").unwrap();

        let comment =
            create_comment(&conn, bob.id, post.id, "<h1>nice</h1> <b>post</b>").unwrap();
        assert_eq!(comment.body, "nice <b>post</b>");
        assert_eq!(comment.author_username, "bob");
        assert_eq!(comment.post_author_username, "alice");
        assert!(!comment.disabled);
        assert_eq!(comment.post_page_url(), format!("/post/alice/{}/", post.id));
    }

    #[test]
    fn comment_on_missing_post_fails() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        assert!(create_comment(&conn, alice.id, 4242, "hello").is_err());
    }

    #[test]
    fn list_for_post_is_scoped_and_paginated() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let first = posts::create_post(&conn, alice.id, "one", "b").unwrap();
        let second = posts::create_post(&conn, alice.id, "two", "b").unwrap();
        for i in 0..3 {
            create_comment(&conn, alice.id, first.id, &format!("c{}", i)).unwrap();
        }
        create_comment(&conn, alice.id, second.id, "elsewhere").unwrap();

        let page = list_for_post(&conn, first.id, 1, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].raw_body, "c2");
        assert_eq!(count_for_post(&conn, first.id).unwrap(), 3);

        let everything = list_all(&conn, 1, 10).unwrap();
        assert_eq!(everything.total, 4);
        assert_eq!(everything.items[0].raw_body, "elsewhere");
    }

    #[test]
    fn set_disabled_toggles_flag() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let post = posts::create_post(&conn, alice.id, "t", "b").unwrap();
        let comment = create_comment(&conn, alice.id, post.id, "rude").unwrap();

        set_disabled(&conn, comment.id, true).unwrap();
        assert!(find_by_id(&conn, comment.id).unwrap().unwrap().disabled);
        set_disabled(&conn, comment.id, false).unwrap();
        assert!(!find_by_id(&conn, comment.id).unwrap().unwrap().disabled);
        assert!(set_disabled(&conn, comment.id + 1, true).is_err());
    }
}
