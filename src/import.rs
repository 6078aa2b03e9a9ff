use std::collections::BTreeSet;
use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::DomainError;
use crate::identity::{self, MemberType};
use crate::members::{self, MemberRole};

// Header tokens as they appear in the roster exports this service ingests.
pub const COL_GROUP_ID: &str = "群组编号";
pub const COL_GROUP_NAME: &str = "群组名称";
pub const COL_TEACHER_ID: &str = "教师工号";
pub const COL_STUDENT_ID: &str = "学生学号";
pub const COL_STUDENT_NAME: &str = "学生姓名";

const REQUIRED_COLS: [&str; 5] = [
    COL_GROUP_ID,
    COL_GROUP_NAME,
    COL_TEACHER_ID,
    COL_STUDENT_ID,
    COL_STUDENT_NAME,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub group_id: String,
    pub group_name: String,
    pub teacher_id: String,
    pub student_id: String,
    pub student_name: String,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub imported: usize,
    pub group_ids: Vec<String>,
}

fn delimiter_for(filename: &str) -> Result<char, DomainError> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".tsv") {
        Ok('\t')
    } else if lower.ends_with(".csv") {
        Ok(',')
    } else {
        Err(DomainError::UnsupportedFormat)
    }
}

/// UTF-8 first (BOM tolerated); GB18030 as the legacy fallback. Bytes that
/// decode under neither are rejected rather than silently mangled.
fn decode_text(bytes: &[u8]) -> Result<String, DomainError> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }
    let (text, _, had_errors) = encoding_rs::GB18030.decode(bytes);
    if had_errors {
        return Err(DomainError::UnreadableEncoding);
    }
    Ok(text.into_owned())
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Structural pass over the raw payload: header validation, then row
/// acceptance. Ragged rows are skipped with a warning; rows missing a
/// required value are dropped silently. No database access here.
pub fn parse_rows(bytes: &[u8], filename: &str) -> Result<Vec<ImportRow>, DomainError> {
    let delimiter = delimiter_for(filename)?;
    let text = decode_text(bytes)?;

    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(DomainError::EmptyContent);
    }

    let headers = split_fields(lines[0], delimiter);
    let missing: Vec<&str> = REQUIRED_COLS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(DomainError::MissingColumns(missing.join(", ")));
    }

    let mut rows: Vec<ImportRow> = Vec::new();
    for (line_num, line) in lines.iter().enumerate().skip(1) {
        let values = split_fields(line, delimiter);
        if values.len() != headers.len() {
            tracing::warn!(
                line = line_num + 1,
                expected = headers.len(),
                got = values.len(),
                "skipping row with mismatched field count"
            );
            continue;
        }
        let by_col: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(String::as_str))
            .collect();
        let all_present = REQUIRED_COLS
            .iter()
            .all(|c| by_col.get(c).map(|v| !v.is_empty()).unwrap_or(false));
        if !all_present {
            continue;
        }
        rows.push(ImportRow {
            group_id: by_col[COL_GROUP_ID].to_string(),
            group_name: by_col[COL_GROUP_NAME].to_string(),
            teacher_id: by_col[COL_TEACHER_ID].to_string(),
            student_id: by_col[COL_STUDENT_ID].to_string(),
            student_name: by_col[COL_STUDENT_NAME].to_string(),
        });
    }

    if rows.is_empty() {
        return Err(DomainError::NoValidRows);
    }
    Ok(rows)
}

/// Reconcile every accepted row inside one transaction spanning the whole
/// file: group upsert, teacher/student identity upserts, then the two
/// membership upserts. Any failure rolls the entire file back; the caller
/// sees import_storage_failed and no partial state.
///
/// A group first created here gets the importing caller as its owner, so
/// the one-active-owner invariant holds on every creation path.
pub fn reconcile(
    conn: &Connection,
    rows: &[ImportRow],
    caller_id: i64,
    caller_type: MemberType,
) -> Result<ImportOutcome, DomainError> {
    let tx = conn.unchecked_transaction()?;

    let apply = || -> Result<(), DomainError> {
        for row in rows {
            let fresh_group = !crate::groups::group_exists(&tx, &row.group_id)?;
            upsert_group_row(&tx, row)?;
            if fresh_group {
                members::create_owner_membership(&tx, &row.group_id, caller_id, caller_type)?;
            }

            // The source row carries no separate teacher display name; the
            // natural id doubles as the name.
            let teacher_internal = identity::upsert_teacher(&tx, &row.teacher_id, &row.teacher_id)?;
            let student_internal =
                identity::upsert_student(&tx, &row.student_id, &row.student_name)?;

            members::upsert_membership(
                &tx,
                &row.group_id,
                student_internal,
                MemberType::Student,
                MemberRole::Member,
            )?;
            members::upsert_membership(
                &tx,
                &row.group_id,
                teacher_internal,
                MemberType::Teacher,
                MemberRole::Admin,
            )?;
        }
        Ok(())
    };

    if let Err(e) = apply() {
        let _ = tx.rollback();
        tracing::error!("import reconcile failed, rolled back: {e}");
        return Err(DomainError::ImportStorageFailed);
    }
    tx.commit().map_err(|e| {
        tracing::error!("import commit failed: {e}");
        DomainError::ImportStorageFailed
    })?;

    let group_ids: BTreeSet<String> = rows.iter().map(|r| r.group_id.clone()).collect();
    Ok(ImportOutcome {
        imported: rows.len(),
        group_ids: group_ids.into_iter().collect(),
    })
}

/// Insert-or-overwrite keyed on group_id; an existing group keeps its
/// description (the file has no description column).
fn upsert_group_row(conn: &Connection, row: &ImportRow) -> Result<(), DomainError> {
    let now = crate::db::now_stamp();
    conn.execute(
        "INSERT INTO groups(group_id, group_name, teacher_id, description, created_at, updated_at)
         VALUES(?, ?, ?, NULL, ?, ?)
         ON CONFLICT(group_id) DO UPDATE SET
           group_name = excluded.group_name,
           teacher_id = excluded.teacher_id,
           updated_at = excluded.updated_at",
        (&row.group_id, &row.group_name, &row.teacher_id, &now, &now),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(delim: char) -> String {
        REQUIRED_COLS.join(&delim.to_string())
    }

    #[test]
    fn rejects_unknown_extension() {
        let e = parse_rows(b"x", "roster.xlsx").unwrap_err();
        assert_eq!(e.code(), "unsupported_format");
    }

    #[test]
    fn parses_tsv_and_csv() {
        let tsv = format!("{}\nG1\t数学一班\tT01\tS001\t张三\n", header('\t'));
        let rows = parse_rows(tsv.as_bytes(), "roster.tsv").expect("tsv rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group_id, "G1");
        assert_eq!(rows[0].student_name, "张三");

        let csv = format!("{}\nG1,数学一班,T01,S001,张三\n", header(','));
        let rows = parse_rows(csv.as_bytes(), "roster.CSV").expect("csv rows");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn utf8_bom_is_tolerated() {
        let mut bytes = b"\xef\xbb\xbf".to_vec();
        bytes.extend_from_slice(format!("{}\nG1,A,T1,S1,N\n", header(',')).as_bytes());
        let rows = parse_rows(&bytes, "r.csv").expect("bom rows");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn gb18030_fallback_decodes() {
        let text = format!("{}\nG1,数学,T1,S1,李四\n", header(','));
        let (encoded, _, _) = encoding_rs::GB18030.encode(&text);
        let rows = parse_rows(&encoded, "r.csv").expect("gb rows");
        assert_eq!(rows[0].student_name, "李四");
        assert_eq!(rows[0].group_name, "数学");
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        // Lone 0x80 is invalid UTF-8 and an invalid GB18030 lead sequence.
        let bytes = [0x80u8, 0x80, 0xff, 0xff];
        let e = parse_rows(&bytes, "r.csv").unwrap_err();
        assert_eq!(e.code(), "unreadable_encoding");
    }

    #[test]
    fn blank_content_is_empty_content() {
        let e = parse_rows(b"\n   \n\n", "r.csv").unwrap_err();
        assert_eq!(e.code(), "empty_content");
    }

    #[test]
    fn missing_header_column_is_named() {
        let partial = format!(
            "{},{},{},{}\nG1,A,T1,S1\n",
            COL_GROUP_ID, COL_GROUP_NAME, COL_TEACHER_ID, COL_STUDENT_ID
        );
        let e = parse_rows(partial.as_bytes(), "r.csv").unwrap_err();
        match e {
            DomainError::MissingColumns(cols) => assert_eq!(cols, COL_STUDENT_NAME),
            other => panic!("expected missing_columns, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_skipped_not_fatal() {
        let csv = format!(
            "{}\nG1,A,T1,S1,Alice\nG1,A,T1\nG1,A,T1,S2,Bob\n",
            header(',')
        );
        let rows = parse_rows(csv.as_bytes(), "r.csv").expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].student_id, "S2");
    }

    #[test]
    fn row_with_blank_required_field_dropped_silently() {
        // The empty field is dropped by the splitter, so the row becomes
        // ragged and is skipped; a file of only such rows has no valid rows.
        let csv = format!("{}\nG1,,T1,S1,Alice\n", header(','));
        let e = parse_rows(csv.as_bytes(), "r.csv").unwrap_err();
        assert_eq!(e.code(), "no_valid_rows");
    }

    #[test]
    fn header_only_file_has_no_valid_rows() {
        let e = parse_rows(header(',').as_bytes(), "r.csv").unwrap_err();
        assert_eq!(e.code(), "no_valid_rows");
    }

    #[test]
    fn reconcile_failure_rolls_back_the_whole_file() {
        let dir = std::env::temp_dir().join(format!(
            "groupsd-import-rollback-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let conn = crate::db::open_db(&dir).expect("open db");
        // Rebuild the students table so the student upsert trips a CHECK
        // after the group, owner membership and teacher rows were written.
        conn.execute_batch(
            "DROP TABLE students;
             CREATE TABLE students(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL CHECK(length(name) = 0),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
             )",
        )
        .expect("rebuild students");

        let rows = vec![ImportRow {
            group_id: "G1".into(),
            group_name: "Math".into(),
            teacher_id: "T1".into(),
            student_id: "S1".into(),
            student_name: "Alice".into(),
        }];
        let e = reconcile(&conn, &rows, 1, MemberType::Admin).unwrap_err();
        assert_eq!(e.code(), "import_storage_failed");

        // Nothing from the file persisted, not even the earlier writes.
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .expect("count")
        };
        assert_eq!(count("groups"), 0);
        assert_eq!(count("teachers"), 0);
        assert_eq!(count("group_members"), 0);
    }
}
