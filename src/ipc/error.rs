use serde_json::json;

use crate::error::DomainError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "status": 200,
        "result": result
    })
}

pub fn err(
    id: &str,
    status: u16,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "status": status,
        "error": error,
    })
}

/// Domain failures carry their own wire code and status. Storage failures
/// additionally get their raw detail logged and redacted from the wire.
pub fn domain_err(id: &str, e: &DomainError) -> serde_json::Value {
    if let DomainError::Storage(inner) = e {
        tracing::error!("storage failure: {inner}");
    }
    err(id, e.status(), e.code(), e.to_string(), None)
}
