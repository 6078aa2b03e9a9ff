use rusqlite::{Connection, OptionalExtension};

use crate::claims::Claim;
use crate::db;
use crate::error::DomainError;

/// Which per-role identity table a principal lives in. Doubles as the
/// membership row's member_type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Student,
    Teacher,
    Admin,
}

impl MemberType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Student => "students",
            Self::Teacher => "teachers",
            Self::Admin => "admins",
        }
    }
}

/// Confirm the claim's subject exists in an identity table consistent with
/// its declared role tags (any table when no recognizable tag is declared).
/// Mandatory before every state-mutating operation that trusts the claim:
/// the claim itself is a forgeable hint, the tables are ground truth.
///
/// Returns the matched types, highest privilege first.
pub fn resolve_caller(conn: &Connection, claim: &Claim) -> Result<Vec<MemberType>, DomainError> {
    if claim.sub <= 0 {
        return Err(DomainError::IdentityNotFound);
    }

    let declared: Vec<MemberType> = claim
        .normalized_roles()
        .iter()
        .filter_map(|r| MemberType::parse(r))
        .collect();
    let candidates: &[MemberType] = if declared.is_empty() {
        &[MemberType::Admin, MemberType::Teacher, MemberType::Student]
    } else {
        &declared
    };

    let mut matched: Vec<MemberType> = Vec::new();
    for ty in [MemberType::Admin, MemberType::Teacher, MemberType::Student] {
        if !candidates.contains(&ty) {
            continue;
        }
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", ty.table());
        let hit: Option<i64> = conn
            .query_row(&sql, [claim.sub], |r| r.get(0))
            .optional()?;
        if hit.is_some() {
            matched.push(ty);
        }
    }

    if matched.is_empty() {
        return Err(DomainError::IdentityNotFound);
    }
    Ok(matched)
}

/// Existence check for a membership target (not the caller), by internal id.
pub fn member_exists(
    conn: &Connection,
    member_id: i64,
    member_type: MemberType,
) -> Result<bool, DomainError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", member_type.table());
    let hit: Option<i64> = conn.query_row(&sql, [member_id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

pub fn teacher_exists_by_external(conn: &Connection, teacher_id: &str) -> Result<bool, DomainError> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE teacher_id = ?", [teacher_id], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// Seed or refresh an identity record by its natural id; returns the
/// internal id. Used by users.create and by the import reconciler (which
/// overwrites the name on conflict per the reconcile rules).
pub fn upsert_student(
    conn: &Connection,
    student_id: &str,
    name: &str,
) -> Result<i64, DomainError> {
    let now = db::now_stamp();
    conn.execute(
        "INSERT INTO students(student_id, name, created_at, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           name = excluded.name,
           updated_at = excluded.updated_at",
        (student_id, name, &now, &now),
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM students WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn upsert_teacher(
    conn: &Connection,
    teacher_id: &str,
    name: &str,
) -> Result<i64, DomainError> {
    let now = db::now_stamp();
    conn.execute(
        "INSERT INTO teachers(teacher_id, name, created_at, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(teacher_id) DO UPDATE SET
           name = excluded.name,
           updated_at = excluded.updated_at",
        (teacher_id, name, &now, &now),
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM teachers WHERE teacher_id = ?",
        [teacher_id],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn upsert_admin(conn: &Connection, username: &str, name: &str) -> Result<i64, DomainError> {
    let now = db::now_stamp();
    conn.execute(
        "INSERT INTO admins(username, name, created_at, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(username) DO UPDATE SET
           name = excluded.name,
           updated_at = excluded.updated_at",
        (username, name, &now, &now),
    )?;
    let id: i64 = conn.query_row("SELECT id FROM admins WHERE username = ?", [username], |r| {
        r.get(0)
    })?;
    Ok(id)
}
