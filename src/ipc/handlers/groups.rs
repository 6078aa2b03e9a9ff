use crate::authz;
use crate::groups::{self, GroupChanges, UpdateOutcome};
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::helpers::{authenticate, primary_type};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn opt_string(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "create groups") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    let Some(group_name) = opt_string(&req.params, "groupName") else {
        return err(&req.id, 400, "bad_params", "missing groupName", None);
    };
    let group_id = opt_string(&req.params, "groupId");
    let teacher_id = opt_string(&req.params, "teacherId");
    let description = opt_string(&req.params, "description");

    match groups::create_group(
        conn,
        group_id,
        group_name,
        teacher_id,
        description,
        claim.sub,
        primary_type(&matched),
    ) {
        Ok(group) => {
            tracing::info!(username = %claim.username, group_id = %group.group_id, "group created");
            ok(
                &req.id,
                json!({
                    "groupId": group.group_id,
                    "groupName": group.group_name,
                    "teacherId": group.teacher_id,
                    "description": group.description,
                    "message": "group created"
                }),
            )
        }
        Err(e) => domain_err(&req.id, &e),
    }
}

fn handle_groups_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "update groups") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };
    let Some(group_id) = opt_string(&req.params, "groupId") else {
        return err(&req.id, 400, "bad_params", "missing groupId", None);
    };

    match groups::group_exists(conn, &group_id) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &crate::error::DomainError::GroupNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }
    if let Err(e) = authz::require_group_manager(conn, &group_id, claim.sub, &matched) {
        return domain_err(&req.id, &e);
    }

    let changes = GroupChanges {
        group_name: opt_string(&req.params, "groupName"),
        teacher_id: opt_string(&req.params, "teacherId"),
        description: opt_string(&req.params, "description"),
    };

    match groups::update_group(conn, &group_id, changes) {
        Ok(UpdateOutcome::Applied) => ok(
            &req.id,
            json!({ "groupId": group_id, "message": "group updated" }),
        ),
        Ok(UpdateOutcome::NoChanges) => ok(
            &req.id,
            json!({ "groupId": group_id, "message": "no changes" }),
        ),
        Err(e) => domain_err(&req.id, &e),
    }
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "delete groups") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };
    let Some(group_id) = opt_string(&req.params, "groupId") else {
        return err(&req.id, 400, "bad_params", "missing groupId", None);
    };

    match groups::group_exists(conn, &group_id) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &crate::error::DomainError::GroupNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }
    // Dissolving a group is owner-only.
    if let Err(e) = authz::require_group_owner(conn, &group_id, claim.sub, &matched) {
        return domain_err(&req.id, &e);
    }

    match groups::delete_group(conn, &group_id) {
        Ok(removed_members) => {
            tracing::info!(username = %claim.username, group_id = %group_id, "group deleted");
            ok(
                &req.id,
                json!({
                    "groupId": group_id,
                    "removedMembers": removed_members,
                    "message": "group deleted"
                }),
            )
        }
        Err(e) => domain_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.update" => Some(handle_groups_update(state, req)),
        "groups.delete" => Some(handle_groups_delete(state, req)),
        _ => None,
    }
}
