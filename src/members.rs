use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::DomainError;
use crate::identity::MemberType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Member,
    Admin,
    Owner,
}

impl MemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    pub fn can_manage_members(self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }
}

#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub member_id: i64,
    pub member_type: String,
    pub role: String,
    pub joined_at: String,
    pub updated_at: String,
}

/// The caller's highest active role in a group. Internal ids are per-table
/// sequences, so a bare member_id is ambiguous across types; the lookup is
/// constrained to the identity types the caller actually resolved to. All
/// reads here filter is_active = 1 so callers cannot forget the soft-delete
/// flag.
pub fn active_role_of(
    conn: &Connection,
    group_id: &str,
    member_id: i64,
    member_types: &[MemberType],
) -> Result<Option<MemberRole>, DomainError> {
    fn rank(r: MemberRole) -> u8 {
        match r {
            MemberRole::Member => 0,
            MemberRole::Admin => 1,
            MemberRole::Owner => 2,
        }
    }
    let mut best: Option<MemberRole> = None;
    for ty in member_types {
        if let Some(role) = active_role_of_exact(conn, group_id, member_id, *ty)? {
            if best.map(|b| rank(role) > rank(b)).unwrap_or(true) {
                best = Some(role);
            }
        }
    }
    Ok(best)
}

pub fn active_role_of_exact(
    conn: &Connection,
    group_id: &str,
    member_id: i64,
    member_type: MemberType,
) -> Result<Option<MemberRole>, DomainError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT role FROM group_members
             WHERE group_id = ? AND member_id = ? AND member_type = ? AND is_active = 1",
            (group_id, member_id, member_type.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|r| MemberRole::parse(&r)))
}

pub fn list_active(conn: &Connection, group_id: &str) -> Result<Vec<MembershipRow>, DomainError> {
    let mut stmt = conn.prepare(
        "SELECT member_id, member_type, role, joined_at, updated_at
         FROM group_members
         WHERE group_id = ? AND is_active = 1
         ORDER BY member_type, member_id",
    )?;
    let rows = stmt
        .query_map([group_id], |r| {
            Ok(MembershipRow {
                member_id: r.get(0)?,
                member_type: r.get(1)?,
                role: r.get(2)?,
                joined_at: r.get(3)?,
                updated_at: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Upsert on the composite key: a re-add reactivates the row and overwrites
/// its role. Idempotent for unchanged input. Authorization happens in the
/// caller; this is the bare ledger primitive (the import reconciler and the
/// owner bootstrap drive it directly).
pub fn upsert_membership(
    conn: &Connection,
    group_id: &str,
    member_id: i64,
    member_type: MemberType,
    role: MemberRole,
) -> Result<(), DomainError> {
    let now = db::now_stamp();
    conn.execute(
        "INSERT INTO group_members(group_id, member_id, member_type, role, is_active, joined_at, updated_at)
         VALUES(?, ?, ?, ?, 1, ?, ?)
         ON CONFLICT(group_id, member_id, member_type) DO UPDATE SET
           is_active = 1,
           role = excluded.role,
           updated_at = excluded.updated_at",
        (group_id, member_id, member_type.as_str(), role.as_str(), &now, &now),
    )?;
    Ok(())
}

/// The creator becomes the first owner atomically with group creation;
/// bypasses the normal add-member gate.
pub fn create_owner_membership(
    conn: &Connection,
    group_id: &str,
    subject_id: i64,
    member_type: MemberType,
) -> Result<(), DomainError> {
    upsert_membership(conn, group_id, subject_id, member_type, MemberRole::Owner)
}

/// Ownership transfer: demote whoever currently holds owner to admin and
/// write the new owner's row, one transaction. Keeps the single-owner
/// invariant; there is never a moment with two active owners.
pub fn assign_owner(
    conn: &Connection,
    group_id: &str,
    member_id: i64,
    member_type: MemberType,
) -> Result<(), DomainError> {
    let tx = conn.unchecked_transaction()?;
    let now = db::now_stamp();
    if let Err(e) = tx.execute(
        "UPDATE group_members SET role = 'admin', updated_at = ?
         WHERE group_id = ? AND role = 'owner' AND is_active = 1",
        (&now, group_id),
    ) {
        let _ = tx.rollback();
        return Err(e.into());
    }
    if let Err(e) = upsert_membership(&tx, group_id, member_id, member_type, MemberRole::Owner) {
        let _ = tx.rollback();
        return Err(e);
    }
    tx.commit()?;
    Ok(())
}

/// Soft delete. The row stays for history; re-adding reactivates it.
pub fn deactivate_membership(
    conn: &Connection,
    group_id: &str,
    member_id: i64,
    member_type: MemberType,
) -> Result<(), DomainError> {
    let now = db::now_stamp();
    conn.execute(
        "UPDATE group_members SET is_active = 0, updated_at = ?
         WHERE group_id = ? AND member_id = ? AND member_type = ?",
        (&now, group_id, member_id, member_type.as_str()),
    )?;
    Ok(())
}

/// Hard delete of every membership row for one group. Only valid as part of
/// whole-group deletion, inside the same transaction.
pub fn delete_all_for_group(conn: &Connection, group_id: &str) -> Result<usize, DomainError> {
    let n = conn.execute("DELETE FROM group_members WHERE group_id = ?", [group_id])?;
    Ok(n)
}
