use crate::audit;
use crate::db;
use crate::import;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::helpers::{authenticate, primary_type};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

fn handle_groups_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState { db, files, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "bulk import groups") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, 400, "bad_params", "missing params.path", None);
    };
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload.bin")
        .to_string();

    let bytes = match std::fs::read(&path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                400,
                "file_read_failed",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    let rows = match import::parse_rows(&bytes, &filename) {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    let outcome = match import::reconcile(conn, &rows, claim.sub, primary_type(&matched)) {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    // Archive the raw upload and leave an audit trail. Best-effort after
    // the commit: a staging hiccup must not fail an applied import.
    let operated_time = db::now_stamp();
    let mut store_key: Option<String> = None;
    match files.put(&filename, &bytes) {
        Ok(key) => {
            let digest = format!("{:x}", Sha256::digest(&bytes));
            let record = conn.execute(
                "INSERT INTO uploaded_files(id, filename, store_key, sha256, size, operated_by, operated_time)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &filename,
                    &key,
                    &digest,
                    bytes.len() as i64,
                    &claim.username,
                    &operated_time,
                ),
            );
            if let Err(e) = record {
                tracing::warn!("uploaded_files record failed: {e}");
            }
            store_key = Some(key);
        }
        Err(e) => tracing::warn!("upload staging failed: {e}"),
    }
    let audit_params = json!({
        "file": filename,
        "imported": outcome.imported,
        "groupIds": outcome.group_ids,
    });
    if let Err(e) = audit::log_operation(
        conn,
        &claim.sub.to_string(),
        &claim.username,
        "import",
        "groups.import",
        Some(&audit_params),
        "success",
    ) {
        tracing::warn!("import audit log failed: {e}");
    }
    tracing::info!(
        username = %claim.username,
        imported = outcome.imported,
        groups = outcome.group_ids.len(),
        "bulk import applied"
    );

    ok(
        &req.id,
        json!({
            "imported": outcome.imported,
            "groupIds": outcome.group_ids,
            "message": format!("imported {} relationship rows", outcome.imported),
            "operatedBy": claim.username,
            "operatedTime": operated_time,
            "uploadedFile": filename,
            "storeKey": store_key,
        }),
    )
}

/// Re-reads an archived upload from the staging store and checks it against
/// the digest recorded at import time.
fn handle_uploads_verify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };
    let Some(store_key) = req.params.get("storeKey").and_then(|v| v.as_str()) else {
        return err(&req.id, 400, "bad_params", "missing storeKey", None);
    };

    let row: Result<(String, String, i64), _> = conn.query_row(
        "SELECT filename, sha256, size FROM uploaded_files WHERE store_key = ?",
        [store_key],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    );
    let (filename, recorded_sha, recorded_size) = match row {
        Ok(v) => v,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return err(&req.id, 404, "upload_not_found", "no archived upload for that key", None)
        }
        Err(e) => return domain_err(&req.id, &e.into()),
    };

    let (_, bytes) = match state.files.get(store_key) {
        Ok(v) => v,
        Err(e) => return err(&req.id, 404, "upload_not_found", e.to_string(), None),
    };
    let actual_sha = format!("{:x}", Sha256::digest(&bytes));

    ok(
        &req.id,
        json!({
            "filename": filename,
            "storeKey": store_key,
            "size": recorded_size,
            "sha256": recorded_sha,
            "verified": actual_sha == recorded_sha && bytes.len() as i64 == recorded_size,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.import" => Some(handle_groups_import(state, req)),
        "uploads.verify" => Some(handle_uploads_verify(state, req)),
        _ => None,
    }
}
