use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Post;
use crate::pagination::{fetch_page, Pagination};
use crate::sanitize::clean_post_body;

const POST_SELECT: &str = "SELECT p.id, p.title, p.image, p.raw_body, p.body, p.timestamp, \
     p.author_id, u.username, \
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) \
     FROM posts p JOIN users u ON u.id = p.author_id";

const NEWEST_FIRST: &str = "ORDER BY p.timestamp DESC, p.id DESC";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        image: row.get(2)?,
        raw_body: row.get(3)?,
        body: row.get(4)?,
        timestamp: row.get(5)?,
        author_id: row.get(6)?,
        author_username: row.get(7)?,
        comment_count: row.get(8)?,
    })
}

/// Insert a post, deriving the sanitized body from `raw_body`.
pub fn create_post(
    conn: &Connection,
    author_id: i64,
    title: &str,
    raw_body: &str,
) -> rusqlite::Result<Post> {
    conn.execute(
        "INSERT INTO posts (title, raw_body, body, timestamp, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, raw_body, clean_post_body(raw_body), Utc::now(), author_id],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
    let sql = format!("{} WHERE p.id = ?1", POST_SELECT);
    conn.query_row(&sql, params![id], post_from_row).optional()
}

/// A post addressed through its author's URL; `None` when the post exists
/// but belongs to someone else.
pub fn find_by_author(
    conn: &Connection,
    author_username: &str,
    id: i64,
) -> rusqlite::Result<Option<Post>> {
    let sql = format!("{} WHERE p.id = ?1 AND u.username = ?2", POST_SELECT);
    conn.query_row(&sql, params![id, author_username], post_from_row)
        .optional()
}

/// Replace title and body; the sanitized body is recomputed.
pub fn update_post(conn: &Connection, id: i64, title: &str, raw_body: &str) -> rusqlite::Result<()> {
    let changed = conn.execute(
        "UPDATE posts SET title = ?1, raw_body = ?2, body = ?3 WHERE id = ?4",
        params![title, raw_body, clean_post_body(raw_body), id],
    )?;
    if changed == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

pub fn set_timestamp(conn: &Connection, id: i64, timestamp: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET timestamp = ?1 WHERE id = ?2",
        params![timestamp, id],
    )?;
    Ok(())
}

pub fn set_image(conn: &Connection, id: i64, image: &str) -> rusqlite::Result<()> {
    conn.execute("UPDATE posts SET image = ?1 WHERE id = ?2", params![image, id])?;
    Ok(())
}

pub fn comment_count(conn: &Connection, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn list_all(conn: &Connection, page: u32, per_page: u32) -> rusqlite::Result<Pagination<Post>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM posts",
        &format!("{} {}", POST_SELECT, NEWEST_FIRST),
        &[],
        page,
        per_page,
        post_from_row,
    )
}

pub fn list_by_author(
    conn: &Connection,
    author_id: i64,
    page: u32,
    per_page: u32,
) -> rusqlite::Result<Pagination<Post>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM posts WHERE author_id = ?",
        &format!("{} WHERE p.author_id = ? {}", POST_SELECT, NEWEST_FIRST),
        &[&author_id],
        page,
        per_page,
        post_from_row,
    )
}

/// Posts by everyone `user_id` follows, their own included through the
/// self-follow row.
pub fn timeline(
    conn: &Connection,
    user_id: i64,
    page: u32,
    per_page: u32,
) -> rusqlite::Result<Pagination<Post>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM posts p
         JOIN follows f ON f.followed_id = p.author_id
         WHERE f.follower_id = ?",
        &format!(
            "{} JOIN follows f ON f.followed_id = p.author_id WHERE f.follower_id = ? {}",
            POST_SELECT, NEWEST_FIRST
        ),
        &[&user_id],
        page,
        per_page,
        post_from_row,
    )
}
