use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::User;
use crate::db::follows;
use crate::db::roles::{self, Permission, ADMINISTRATOR_ROLE};

pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.name, u.confirmed, u.password_hash, \
     u.profile_image, u.location, u.about_me, u.member_since, u.last_seen, \
     u.premium_account, u.role_id, r.name, COALESCE(r.permissions, 0)";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub confirmed: bool,
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        confirmed: row.get(4)?,
        password_hash: row.get(5)?,
        profile_image: row.get(6)?,
        location: row.get(7)?,
        about_me: row.get(8)?,
        member_since: row.get(9)?,
        last_seen: row.get(10)?,
        premium_account: row.get(11)?,
        role_id: row.get(12)?,
        role_name: row.get(13)?,
        permissions: Permission::from_bits(row.get(14)?),
    })
}

fn find_where(
    conn: &Connection,
    clause: &str,
    value: &dyn rusqlite::ToSql,
) -> rusqlite::Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users u LEFT JOIN roles r ON r.id = u.role_id WHERE {}",
        USER_COLUMNS, clause
    );
    conn.query_row(&sql, params![value], user_from_row)
        .optional()
}

/// Insert a user. An `administrator` gets the Administrator role and a
/// premium account; everyone else gets the default role. The new user
/// always follows themself.
pub fn create_user(
    conn: &Connection,
    new_user: &NewUser<'_>,
    administrator: bool,
) -> rusqlite::Result<User> {
    let role = if administrator {
        roles::find_by_name(conn, ADMINISTRATOR_ROLE)?
    } else {
        None
    };
    let (role, premium) = match role {
        Some(role) => (Some(role), true),
        None => (roles::default_role(conn)?, false),
    };

    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (username, email, confirmed, password_hash, member_since, last_seen,
                            premium_account, role_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7)",
        params![
            new_user.username,
            new_user.email,
            new_user.confirmed,
            new_user.password_hash,
            now,
            premium,
            role.map(|r| r.id),
        ],
    )?;
    let id = conn.last_insert_rowid();
    follows::follow(conn, id, id)?;

    find_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    find_where(conn, "u.id = ?1", &id)
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    find_where(conn, "u.username = ?1", &username)
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    find_where(conn, "u.email = ?1 COLLATE NOCASE", &email)
}

pub fn username_taken(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
}

pub fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 COLLATE NOCASE",
        params![email],
        |row| row.get(0),
    )
}

pub struct ProfileUpdate<'a> {
    pub name: Option<&'a str>,
    pub username: &'a str,
    pub location: Option<&'a str>,
    pub about_me: Option<&'a str>,
}

pub fn update_profile(
    conn: &Connection,
    id: i64,
    update: &ProfileUpdate<'_>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET name = ?1, username = ?2, location = ?3, about_me = ?4 WHERE id = ?5",
        params![update.name, update.username, update.location, update.about_me, id],
    )?;
    Ok(())
}

/// Fields only an administrator may change.
pub struct AdminUpdate<'a> {
    pub email: &'a str,
    pub confirmed: bool,
    pub role_id: i64,
    pub password_hash: Option<&'a str>,
}

pub fn update_admin_fields(
    conn: &Connection,
    id: i64,
    update: &AdminUpdate<'_>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET email = ?1, confirmed = ?2, role_id = ?3 WHERE id = ?4",
        params![update.email, update.confirmed, update.role_id, id],
    )?;
    if let Some(hash) = update.password_hash {
        set_password_hash(conn, id, hash)?;
    }
    Ok(())
}

pub fn set_password_hash(conn: &Connection, id: i64, hash: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![hash, id],
    )?;
    Ok(())
}

pub fn set_email(conn: &Connection, id: i64, email: &str) -> rusqlite::Result<()> {
    conn.execute("UPDATE users SET email = ?1 WHERE id = ?2", params![email, id])?;
    Ok(())
}

pub fn confirm(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("UPDATE users SET confirmed = 1 WHERE id = ?1", params![id])?;
    Ok(())
}

/// Record activity for `last_seen`.
pub fn ping(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET last_seen = ?1 WHERE id = ?2",
        params![Utc::now(), id],
    )?;
    Ok(())
}

pub fn set_profile_image(conn: &Connection, id: i64, image: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET profile_image = ?1 WHERE id = ?2",
        params![image, id],
    )?;
    Ok(())
}

pub fn set_premium(conn: &Connection, id: i64, premium: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET premium_account = ?1 WHERE id = ?2",
        params![premium, id],
    )?;
    Ok(())
}

pub fn post_count(conn: &Connection, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
        params![id],
        |row| row.get(0),
    )
}

/// Give every user missing one their self-follow row. Returns how many
/// rows were added.
pub fn add_self_follows(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followed_id, timestamp)
         SELECT id, id, ?1 FROM users",
        params![Utc::now()],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_pool;

    pub(crate) fn insert_user(conn: &Connection, username: &str) -> User {
        create_user(
            conn,
            &NewUser {
                username,
                email: &format!("{}@example.com", username),
                password_hash: "not-a-real-hash",
                confirmed: true,
            },
            false,
        )
        .unwrap()
    }

    #[test]
    fn create_user_assigns_default_role_and_self_follow() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        let user = insert_user(&conn, "alice");
        assert_eq!(user.role_name.as_deref(), Some("User"));
        assert!(user.can(Permission::WRITE));
        assert!(!user.is_administrator());
        assert!(!user.premium_account);
        assert_eq!(user.profile_image, "default_profile_image.svg");
        assert!(follows::is_following(&conn, user.id, user.id).unwrap());
    }

    #[test]
    fn administrator_gets_admin_role_and_premium() {
        let pool = test_pool();
        let conn = pool.get().unwrap();

        let user = create_user(
            &conn,
            &NewUser {
                username: "boss",
                email: "Boss@Example.com",
                password_hash: "x",
                confirmed: false,
            },
            true,
        )
        .unwrap();
        assert_eq!(user.role_name.as_deref(), Some("Administrator"));
        assert!(user.is_administrator());
        assert!(user.can(Permission::MODERATE));
        assert!(user.premium_account);
    }

    #[test]
    fn duplicate_username_or_email_is_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "alice");

        let same_name = create_user(
            &conn,
            &NewUser {
                username: "alice",
                email: "other@example.com",
                password_hash: "x",
                confirmed: false,
            },
            false,
        );
        assert!(same_name.is_err());

        let same_email = create_user(
            &conn,
            &NewUser {
                username: "alice2",
                email: "alice@example.com",
                password_hash: "x",
                confirmed: false,
            },
            false,
        );
        assert!(same_email.is_err());

        // The column itself ignores case, not just the lookups.
        let same_email_upper = conn.execute(
            "INSERT INTO users (username, email, password_hash, member_since, last_seen)
             VALUES ('alice3', 'ALICE@Example.com', 'x', ?1, ?1)",
            params![Utc::now()],
        );
        assert!(same_email_upper.is_err());

        assert!(username_taken(&conn, "alice").unwrap());
        assert!(!username_taken(&conn, "Alice2").unwrap());
        assert!(email_taken(&conn, "ALICE@example.com").unwrap());
    }

    #[test]
    fn lookups_by_username_email_and_id() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");

        assert_eq!(find_by_username(&conn, "alice").unwrap().unwrap().id, alice.id);
        assert_eq!(
            find_by_email(&conn, "Alice@Example.com").unwrap().unwrap().id,
            alice.id
        );
        assert!(find_by_id(&conn, alice.id + 100).unwrap().is_none());
    }

    #[test]
    fn profile_and_admin_updates_persist() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let moderator = roles::find_by_name(&conn, "Moderator").unwrap().unwrap();

        update_profile(
            &conn,
            alice.id,
            &ProfileUpdate {
                name: Some("Alice Liddell"),
                username: "alice_l",
                location: Some("Oxford"),
                about_me: None,
            },
        )
        .unwrap();
        update_admin_fields(
            &conn,
            alice.id,
            &AdminUpdate {
                email: "new@example.com",
                confirmed: false,
                role_id: moderator.id,
                password_hash: Some("new-hash"),
            },
        )
        .unwrap();

        let updated = find_by_id(&conn, alice.id).unwrap().unwrap();
        assert_eq!(updated.username, "alice_l");
        assert_eq!(updated.name.as_deref(), Some("Alice Liddell"));
        assert_eq!(updated.location.as_deref(), Some("Oxford"));
        assert_eq!(updated.email, "new@example.com");
        assert!(!updated.confirmed);
        assert_eq!(updated.role_name.as_deref(), Some("Moderator"));
        assert_eq!(updated.password_hash, "new-hash");
    }

    #[test]
    fn add_self_follows_repairs_missing_rows() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        conn.execute("DELETE FROM follows", []).unwrap();

        assert_eq!(add_self_follows(&conn).unwrap(), 1);
        assert!(follows::is_following(&conn, alice.id, alice.id).unwrap());
        assert_eq!(add_self_follows(&conn).unwrap(), 0);
    }

    #[test]
    fn ping_moves_last_seen_forward() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        std::thread::sleep(std::time::Duration::from_millis(5));

        ping(&conn, alice.id).unwrap();

        let after = find_by_id(&conn, alice.id).unwrap().unwrap();
        assert!(after.last_seen > alice.last_seen);
    }
}
