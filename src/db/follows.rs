use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::models::FollowEntry;
use crate::pagination::{fetch_page, Pagination};

/// Make `follower_id` follow `followed_id`. Following twice is a no-op.
pub fn follow(conn: &Connection, follower_id: i64, followed_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followed_id, timestamp) VALUES (?1, ?2, ?3)",
        params![follower_id, followed_id, Utc::now()],
    )?;
    Ok(())
}

/// Remove a follow. The self-follow row is kept so the timeline still
/// includes the user's own posts. Returns whether a row was removed.
pub fn unfollow(conn: &Connection, follower_id: i64, followed_id: i64) -> rusqlite::Result<bool> {
    if follower_id == followed_id {
        return Ok(false);
    }
    let removed = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![follower_id, followed_id],
    )?;
    Ok(removed > 0)
}

pub fn is_following(conn: &Connection, follower_id: i64, followed_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![follower_id, followed_id],
        |row| row.get(0),
    )
}

pub fn is_followed_by(conn: &Connection, user_id: i64, other_id: i64) -> rusqlite::Result<bool> {
    is_following(conn, other_id, user_id)
}

/// Number of other users following `user_id`.
pub fn follower_count(conn: &Connection, user_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE followed_id = ?1 AND follower_id != ?1",
        params![user_id],
        |row| row.get(0),
    )
}

/// Number of other users `user_id` follows.
pub fn followed_count(conn: &Connection, user_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND followed_id != ?1",
        params![user_id],
        |row| row.get(0),
    )
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<FollowEntry> {
    Ok(FollowEntry {
        user_id: row.get(0)?,
        username: row.get(1)?,
        profile_image: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

/// Users following `user_id`, most recent first.
pub fn followers(
    conn: &Connection,
    user_id: i64,
    page: u32,
    per_page: u32,
) -> rusqlite::Result<Pagination<FollowEntry>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM follows WHERE followed_id = ? AND follower_id != followed_id",
        "SELECT u.id, u.username, u.profile_image, f.timestamp
         FROM follows f JOIN users u ON u.id = f.follower_id
         WHERE f.followed_id = ? AND f.follower_id != f.followed_id
         ORDER BY f.timestamp DESC, u.id DESC",
        &[&user_id],
        page,
        per_page,
        entry_from_row,
    )
}

/// Users `user_id` follows, most recent first.
pub fn followed(
    conn: &Connection,
    user_id: i64,
    page: u32,
    per_page: u32,
) -> rusqlite::Result<Pagination<FollowEntry>> {
    fetch_page(
        conn,
        "SELECT COUNT(*) FROM follows WHERE follower_id = ? AND follower_id != followed_id",
        "SELECT u.id, u.username, u.profile_image, f.timestamp
         FROM follows f JOIN users u ON u.id = f.followed_id
         WHERE f.follower_id = ? AND f.follower_id != f.followed_id
         ORDER BY f.timestamp DESC, u.id DESC",
        &[&user_id],
        page,
        per_page,
        entry_from_row,
    )
}
