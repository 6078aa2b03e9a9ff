use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("groups.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id TEXT NOT NULL UNIQUE,
            group_name TEXT NOT NULL,
            teacher_id TEXT,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            name TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Membership is one table keyed by the natural composite key with a
    // soft-delete flag; every read must filter is_active = 1 (the filter
    // lives behind the members module's read helpers).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members(
            group_id TEXT NOT NULL,
            member_id INTEGER NOT NULL,
            member_type TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            joined_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(group_id, member_id, member_type),
            FOREIGN KEY(group_id) REFERENCES groups(group_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_members_member
         ON group_members(member_id, member_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_members_group_active
         ON group_members(group_id, is_active)",
        [],
    )?;

    // Upload archive metadata; raw bytes live in the file store.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS uploaded_files(
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            store_key TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            size INTEGER NOT NULL,
            operated_by TEXT NOT NULL,
            operated_time TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS operation_logs(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            username TEXT NOT NULL,
            operation_type TEXT NOT NULL,
            operation_path TEXT NOT NULL,
            operation_params TEXT,
            operation_time TEXT NOT NULL,
            status TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_operation_logs_type
         ON operation_logs(operation_type)",
        [],
    )?;

    // Existing workspaces may predate the upload size column. Add if needed.
    ensure_uploaded_files_size(&conn)?;

    Ok(conn)
}

pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn ensure_uploaded_files_size(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "uploaded_files", "size")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE uploaded_files ADD COLUMN size INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
