use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::{is_unique_violation, DomainError};
use crate::identity::{self, MemberType};
use crate::members;

#[derive(Debug, Clone)]
pub struct Group {
    pub group_id: String,
    pub group_name: String,
    pub teacher_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct GroupChanges {
    pub group_name: Option<String>,
    pub teacher_id: Option<String>,
    pub description: Option<String>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        self.group_name.is_none() && self.teacher_id.is_none() && self.description.is_none()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    NoChanges,
}

pub fn group_exists(conn: &Connection, group_id: &str) -> Result<bool, DomainError> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM groups WHERE group_id = ?", [group_id], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

/// Next unused positive numeric id as a string: max over the numeric
/// group_ids plus one, "1" when none exist. Non-numeric ids are ignored.
pub fn next_group_id(conn: &Connection) -> Result<String, DomainError> {
    let mut stmt = conn.prepare("SELECT group_id FROM groups")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let max = ids
        .iter()
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    Ok((max + 1).to_string())
}

/// Group row plus the creator's owner membership, one atomic unit: either
/// both land or neither does.
pub fn create_group(
    conn: &Connection,
    group_id: Option<String>,
    group_name: String,
    teacher_id: Option<String>,
    description: Option<String>,
    creator_id: i64,
    creator_type: MemberType,
) -> Result<Group, DomainError> {
    if let Some(tid) = teacher_id.as_deref() {
        if !identity::teacher_exists_by_external(conn, tid)? {
            return Err(DomainError::TeacherNotFound);
        }
    }

    let tx = conn.unchecked_transaction()?;
    let resolved_id = match group_id {
        Some(id) => id,
        None => next_group_id(&tx)?,
    };

    let now = db::now_stamp();
    let inserted = tx.execute(
        "INSERT INTO groups(group_id, group_name, teacher_id, description, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &resolved_id,
            &group_name,
            teacher_id.as_deref(),
            description.as_deref(),
            &now,
            &now,
        ),
    );
    if let Err(e) = inserted {
        let _ = tx.rollback();
        if is_unique_violation(&e) {
            return Err(DomainError::DuplicateGroupId);
        }
        return Err(e.into());
    }

    if let Err(e) = members::create_owner_membership(&tx, &resolved_id, creator_id, creator_type) {
        let _ = tx.rollback();
        return Err(e);
    }

    tx.commit()?;
    Ok(Group {
        group_id: resolved_id,
        group_name,
        teacher_id,
        description,
    })
}

/// Partial update; only provided fields are written. Zero provided fields
/// is a successful no-op, not an error.
pub fn update_group(
    conn: &Connection,
    group_id: &str,
    changes: GroupChanges,
) -> Result<UpdateOutcome, DomainError> {
    if !group_exists(conn, group_id)? {
        return Err(DomainError::GroupNotFound);
    }
    if changes.is_empty() {
        return Ok(UpdateOutcome::NoChanges);
    }
    if let Some(tid) = changes.teacher_id.as_deref() {
        if !identity::teacher_exists_by_external(conn, tid)? {
            return Err(DomainError::TeacherNotFound);
        }
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(name) = changes.group_name {
        sets.push("group_name = ?");
        params.push(Box::new(name));
    }
    if let Some(tid) = changes.teacher_id {
        sets.push("teacher_id = ?");
        params.push(Box::new(tid));
    }
    if let Some(desc) = changes.description {
        sets.push("description = ?");
        params.push(Box::new(desc));
    }
    sets.push("updated_at = ?");
    params.push(Box::new(db::now_stamp()));
    params.push(Box::new(group_id.to_string()));

    let sql = format!("UPDATE groups SET {} WHERE group_id = ?", sets.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())))?;
    Ok(UpdateOutcome::Applied)
}

/// Dissolve: membership rows go first, then the group row, one transaction.
/// This is the only path that hard-deletes membership rows.
pub fn delete_group(conn: &Connection, group_id: &str) -> Result<usize, DomainError> {
    if !group_exists(conn, group_id)? {
        return Err(DomainError::GroupNotFound);
    }

    let tx = conn.unchecked_transaction()?;
    let removed = match members::delete_all_for_group(&tx, group_id) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return Err(e);
        }
    };
    if let Err(e) = tx.execute("DELETE FROM groups WHERE group_id = ?", [group_id]) {
        let _ = tx.rollback();
        return Err(e.into());
    }
    tx.commit()?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn fresh_db(tag: &str) -> Connection {
        let dir = std::env::temp_dir().join(format!(
            "groupsd-{}-{}",
            tag,
            uuid::Uuid::new_v4().simple()
        ));
        db::open_db(&dir).expect("open db")
    }

    #[test]
    fn failed_owner_insert_rolls_back_the_group_row() {
        let conn = fresh_db("create-rollback");
        // Rebuild the membership table with a constraint no row satisfies,
        // so the owner write fails after the group insert succeeded.
        conn.execute_batch(
            "DROP TABLE group_members;
             CREATE TABLE group_members(
                group_id TEXT NOT NULL,
                member_id INTEGER NOT NULL,
                member_type TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                joined_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY(group_id, member_id, member_type),
                CHECK(member_id < 0)
             )",
        )
        .expect("rebuild group_members");

        let err = create_group(
            &conn,
            Some("G1".into()),
            "Math".into(),
            None,
            None,
            1,
            MemberType::Admin,
        )
        .expect_err("owner insert must fail");
        assert!(matches!(err, DomainError::Storage(_)));

        // Group row and owner membership land together or not at all.
        assert!(!group_exists(&conn, "G1").expect("exists check"));
    }

    #[test]
    fn auto_id_skips_non_numeric_ids() {
        let conn = fresh_db("auto-id");
        create_group(&conn, Some("G-lab".into()), "Lab".into(), None, None, 1, MemberType::Admin)
            .expect("explicit id");
        assert_eq!(next_group_id(&conn).expect("next id"), "1");
        create_group(&conn, Some("7".into()), "Seven".into(), None, None, 1, MemberType::Admin)
            .expect("numeric id");
        assert_eq!(next_group_id(&conn).expect("next id"), "8");
    }
}
