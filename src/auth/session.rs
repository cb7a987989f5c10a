use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::User;
use crate::db::users::{user_from_row, USER_COLUMNS};

/// Create a new session for a user. Returns the session token.
pub fn create_session(conn: &Connection, user_id: i64, hours: u64) -> rusqlite::Result<String> {
    let token = generate_token();
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, datetime('now', ?3))",
        params![token, user_id, format!("+{} hours", hours)],
    )?;
    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// The user owning an unexpired session.
pub fn find_session_user(conn: &Connection, token: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM sessions s
         JOIN users u ON u.id = s.user_id
         LEFT JOIN roles r ON r.id = u.role_id
         WHERE s.token = ?1 AND s.expires_at > datetime('now')",
        USER_COLUMNS
    );
    conn.query_row(
        &sql,
        params![token],
        user_from_row,
    )
    .optional()
}

/// Drop expired sessions. Returns how many were removed.
pub fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
