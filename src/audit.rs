use rusqlite::Connection;

use crate::db;
use crate::error::DomainError;

/// Append one operation_logs row and return its id. Backs notify.push and
/// the post-import audit trail.
pub fn log_operation(
    conn: &Connection,
    user_id: &str,
    username: &str,
    operation_type: &str,
    operation_path: &str,
    operation_params: Option<&serde_json::Value>,
    status: &str,
) -> Result<i64, DomainError> {
    let params_text = operation_params.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO operation_logs(user_id, username, operation_type, operation_path,
                                    operation_params, operation_time, status)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            user_id,
            username,
            operation_type,
            operation_path,
            params_text.as_deref(),
            db::now_stamp(),
            status,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}
