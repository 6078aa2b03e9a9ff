use crate::authz;
use crate::error::DomainError;
use crate::groups;
use crate::identity::{self, MemberType};
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::helpers::authenticate;
use crate::ipc::types::{AppState, Request};
use crate::members::{self, MemberRole};
use serde_json::json;

struct MemberParams {
    group_id: String,
    member_id: i64,
    member_type: MemberType,
}

fn parse_member_params(params: &serde_json::Value) -> Result<MemberParams, DomainError> {
    let group_id = params
        .get("groupId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DomainError::InvalidArgument("missing groupId".into()))?;
    let member_id = params
        .get("memberId")
        .and_then(|v| v.as_i64())
        .filter(|id| *id > 0)
        .ok_or_else(|| DomainError::InvalidArgument("memberId must be a positive integer".into()))?;
    let member_type = params
        .get("memberType")
        .and_then(|v| v.as_str())
        .and_then(MemberType::parse)
        .ok_or_else(|| {
            DomainError::InvalidArgument("memberType must be one of: student, teacher, admin".into())
        })?;
    Ok(MemberParams {
        group_id,
        member_id,
        member_type,
    })
}

fn handle_members_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "add group members") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    let p = match parse_member_params(&req.params) {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };
    // Omitted role defaults to plain member.
    let role_raw = req
        .params
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("member");
    let Some(role) = MemberRole::parse(role_raw) else {
        return domain_err(
            &req.id,
            &DomainError::InvalidArgument("role must be one of: member, admin, owner".into()),
        );
    };

    match groups::group_exists(conn, &p.group_id) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &DomainError::GroupNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }
    if let Err(e) = authz::require_group_manager(conn, &p.group_id, claim.sub, &matched) {
        return domain_err(&req.id, &e);
    }

    match identity::member_exists(conn, p.member_id, p.member_type) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &DomainError::MemberNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }

    let result = if role == MemberRole::Owner {
        // Appointing an owner is the ownership-transfer path: owner-only,
        // and the previous owner is demoted in the same transaction.
        if let Err(e) = authz::require_group_owner(conn, &p.group_id, claim.sub, &matched) {
            return domain_err(&req.id, &e);
        }
        members::assign_owner(conn, &p.group_id, p.member_id, p.member_type)
    } else {
        members::upsert_membership(conn, &p.group_id, p.member_id, p.member_type, role)
    };

    match result {
        Ok(()) => ok(
            &req.id,
            json!({
                "groupId": p.group_id,
                "memberId": p.member_id,
                "memberType": p.member_type.as_str(),
                "role": role.as_str(),
                "message": "member added/updated"
            }),
        ),
        Err(e) => domain_err(&req.id, &e),
    }
}

fn handle_members_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let (claim, matched) = match authenticate(conn, &req.params, "remove group members") {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };
    let p = match parse_member_params(&req.params) {
        Ok(v) => v,
        Err(e) => return domain_err(&req.id, &e),
    };

    match groups::group_exists(conn, &p.group_id) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &DomainError::GroupNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }
    if let Err(e) = authz::require_group_manager(conn, &p.group_id, claim.sub, &matched) {
        return domain_err(&req.id, &e);
    }

    let target_role =
        match members::active_role_of_exact(conn, &p.group_id, p.member_id, p.member_type) {
            Ok(v) => v,
            Err(e) => return domain_err(&req.id, &e),
        };
    let Some(target_role) = target_role else {
        return domain_err(&req.id, &DomainError::MemberNotFound);
    };
    if target_role == MemberRole::Owner {
        // Ownership must be transferred first, or the group dissolved.
        return domain_err(
            &req.id,
            &DomainError::PermissionDenied("cannot remove owner directly".into()),
        );
    }

    match members::deactivate_membership(conn, &p.group_id, p.member_id, p.member_type) {
        Ok(()) => ok(
            &req.id,
            json!({
                "groupId": p.group_id,
                "memberId": p.member_id,
                "memberType": p.member_type.as_str(),
                "message": "member removed"
            }),
        ),
        Err(e) => domain_err(&req.id, &e),
    }
}

fn handle_members_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };

    let Some(group_id) = req.params.get("groupId").and_then(|v| v.as_str()) else {
        return err(&req.id, 400, "bad_params", "missing groupId", None);
    };
    match groups::group_exists(conn, group_id) {
        Ok(true) => {}
        Ok(false) => return domain_err(&req.id, &DomainError::GroupNotFound),
        Err(e) => return domain_err(&req.id, &e),
    }

    match members::list_active(conn, group_id) {
        Ok(rows) => {
            let items: Vec<serde_json::Value> = rows
                .iter()
                .map(|m| {
                    json!({
                        "memberId": m.member_id,
                        "memberType": m.member_type,
                        "role": m.role,
                        "joinedAt": m.joined_at,
                        "updatedAt": m.updated_at
                    })
                })
                .collect();
            ok(&req.id, json!({ "groupId": group_id, "members": items }))
        }
        Err(e) => domain_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.members.add" => Some(handle_members_add(state, req)),
        "groups.members.remove" => Some(handle_members_remove(state, req)),
        "groups.members.list" => Some(handle_members_list(state, req)),
        _ => None,
    }
}
