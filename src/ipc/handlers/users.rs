use crate::identity::{self, MemberType};
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Seeds identity records. Existence in a per-role table is a precondition
/// for acting as a caller or appearing as a group member.
fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let Some(user_type_raw) = req.params.get("userType").and_then(|v| v.as_str()) else {
        return err(&req.id, 400, "bad_params", "missing userType", None);
    };
    let Some(user_type) = MemberType::parse(user_type_raw) else {
        return err(
            &req.id,
            400,
            "bad_params",
            "userType must be one of: student, teacher, admin",
            None,
        );
    };
    let external_id = match req.params.get("externalId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, 400, "bad_params", "missing externalId", None),
    };
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| external_id.clone());

    let result = match user_type {
        MemberType::Student => identity::upsert_student(conn, &external_id, &name),
        MemberType::Teacher => identity::upsert_teacher(conn, &external_id, &name),
        MemberType::Admin => identity::upsert_admin(conn, &external_id, &name),
    };

    match result {
        Ok(id) => ok(
            &req.id,
            json!({
                "id": id,
                "userType": user_type.as_str(),
                "externalId": external_id,
                "name": name
            }),
        ),
        Err(e) => domain_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        _ => None,
    }
}
