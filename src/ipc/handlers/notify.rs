use crate::audit;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Records a notification event in the operation log. Querying the log is
/// out of scope here; the row is the deliverable.
fn handle_notify_push(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let Some(title) = req.params.get("title").and_then(|v| v.as_str()) else {
        return err(&req.id, 400, "bad_params", "missing title", None);
    };
    let Some(content) = req.params.get("content").and_then(|v| v.as_str()) else {
        return err(&req.id, 400, "bad_params", "missing content", None);
    };
    let target_user_id = req.params.get("targetUserId").and_then(|v| v.as_str());
    let target_username = req.params.get("targetUsername").and_then(|v| v.as_str());

    let op_params = json!({
        "title": title,
        "content": content,
        "targetUserId": target_user_id,
        "targetUsername": target_username,
    });
    let result = audit::log_operation(
        conn,
        target_user_id.unwrap_or("system"),
        target_username.unwrap_or("system"),
        "notify",
        "notify.push",
        Some(&op_params),
        "success",
    );

    match result {
        Ok(id) => ok(&req.id, json!({ "id": id, "message": "notification recorded" })),
        Err(e) => domain_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notify.push" => Some(handle_notify_push(state, req)),
        _ => None,
    }
}
