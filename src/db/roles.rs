use std::ops::BitOr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::models::Role;

/// Bit set of permissions carried by a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    pub const NONE: Permission = Permission(0);
    pub const FOLLOW: Permission = Permission(1);
    pub const COMMENT: Permission = Permission(2);
    pub const WRITE: Permission = Permission(4);
    pub const MODERATE: Permission = Permission(8);
    pub const ADMIN: Permission = Permission(16);

    pub const fn from_bits(bits: u32) -> Self {
        Permission(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Permission) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

pub const USER_ROLE: &str = "User";
pub const MODERATOR_ROLE: &str = "Moderator";
pub const ADMINISTRATOR_ROLE: &str = "Administrator";

/// The fixed role table: (name, permissions, is default).
pub fn role_definitions() -> [(&'static str, Permission, bool); 3] {
    let user = Permission::FOLLOW | Permission::COMMENT | Permission::WRITE;
    let moderator = user | Permission::MODERATE;
    let administrator = moderator | Permission::ADMIN;
    [
        (USER_ROLE, user, true),
        (MODERATOR_ROLE, moderator, false),
        (ADMINISTRATOR_ROLE, administrator, false),
    ]
}

/// Create or refresh the fixed roles. Safe to run on every startup.
pub fn insert_roles(conn: &Connection) -> rusqlite::Result<()> {
    for (name, permissions, default_role) in role_definitions() {
        conn.execute(
            "INSERT INTO roles (name, permissions, default_role) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
               permissions = excluded.permissions,
               default_role = excluded.default_role",
            params![name, permissions.bits(), default_role],
        )?;
    }
    Ok(())
}

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        default_role: row.get(2)?,
        permissions: Permission::from_bits(row.get(3)?),
    })
}

pub fn find_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Role>> {
    conn.query_row(
        "SELECT id, name, default_role, permissions FROM roles WHERE name = ?1",
        params![name],
        role_from_row,
    )
    .optional()
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Role>> {
    conn.query_row(
        "SELECT id, name, default_role, permissions FROM roles WHERE id = ?1",
        params![id],
        role_from_row,
    )
    .optional()
}

pub fn default_role(conn: &Connection) -> rusqlite::Result<Option<Role>> {
    conn.query_row(
        "SELECT id, name, default_role, permissions FROM roles WHERE default_role = 1 LIMIT 1",
        [],
        role_from_row,
    )
    .optional()
}

pub fn list_roles(conn: &Connection) -> rusqlite::Result<Vec<Role>> {
    let mut stmt =
        conn.prepare("SELECT id, name, default_role, permissions FROM roles ORDER BY name")?;
    let roles = stmt
        .query_map([], role_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roles)
}
