use thiserror::Error;

/// Business-rule and storage failures surfaced by the domain modules.
/// Handlers map each variant to a wire code plus an HTTP-style status;
/// raw storage detail stays in the log, not on the wire.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("caller identity not found")]
    IdentityNotFound,

    #[error("group not found")]
    GroupNotFound,

    #[error("member not found in this group")]
    MemberNotFound,

    #[error("teacher not found")]
    TeacherNotFound,

    #[error("group id already exists")]
    DuplicateGroupId,

    #[error("unsupported file format; expected .tsv or .csv")]
    UnsupportedFormat,

    #[error("file content is not valid UTF-8 or GB18030 text")]
    UnreadableEncoding,

    #[error("file has no usable text content")]
    EmptyContent,

    #[error("file is missing required columns: {0}")]
    MissingColumns(String),

    #[error("file contains no valid relationship rows")]
    NoValidRows,

    #[error("import failed; no rows were applied")]
    ImportStorageFailed,

    #[error("storage failure")]
    Storage(#[source] rusqlite::Error),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::PermissionDenied(_) => "permission_denied",
            Self::IdentityNotFound => "identity_not_found",
            Self::GroupNotFound => "group_not_found",
            Self::MemberNotFound => "member_not_found",
            Self::TeacherNotFound => "teacher_not_found",
            Self::DuplicateGroupId => "duplicate_group_id",
            Self::UnsupportedFormat => "unsupported_format",
            Self::UnreadableEncoding => "unreadable_encoding",
            Self::EmptyContent => "empty_content",
            Self::MissingColumns(_) => "missing_columns",
            Self::NoValidRows => "no_valid_rows",
            Self::ImportStorageFailed => "import_storage_failed",
            Self::Storage(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidArgument(_)
            | Self::UnsupportedFormat
            | Self::UnreadableEncoding
            | Self::EmptyContent
            | Self::MissingColumns(_)
            | Self::NoValidRows => 400,
            Self::PermissionDenied(_) | Self::IdentityNotFound => 403,
            Self::GroupNotFound | Self::MemberNotFound | Self::TeacherNotFound => 404,
            Self::DuplicateGroupId => 409,
            Self::ImportStorageFailed | Self::Storage(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for DomainError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e)
    }
}

/// SQLITE_CONSTRAINT_UNIQUE / _PRIMARYKEY, used to turn a duplicate
/// group_id insert into a 409 instead of an opaque 500. Other constraint
/// failures (NOT NULL, CHECK, FK) stay storage failures.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn only_uniqueness_failures_count_as_unique_violations() {
        let conn = Connection::open_in_memory().expect("memory db");
        conn.execute_batch("CREATE TABLE t(a TEXT NOT NULL UNIQUE, b TEXT NOT NULL)")
            .expect("schema");
        conn.execute("INSERT INTO t(a, b) VALUES('x', 'y')", [])
            .expect("seed row");

        let dup = conn
            .execute("INSERT INTO t(a, b) VALUES('x', 'z')", [])
            .expect_err("duplicate a");
        assert!(is_unique_violation(&dup));

        let not_null = conn
            .execute("INSERT INTO t(a, b) VALUES('w', NULL)", [])
            .expect_err("null b");
        assert!(!is_unique_violation(&not_null));
    }
}
