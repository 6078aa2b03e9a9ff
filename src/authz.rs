use rusqlite::Connection;

use crate::claims::Claim;
use crate::error::DomainError;
use crate::identity::MemberType;
use crate::members::{self, MemberRole};

/// Coarse first filter on the *declared* role set. A claim can declare any
/// tag, so passing this gate proves nothing by itself; the membership gate
/// and the identity resolver hold the ground truth.
pub fn require_claim_role(claim: &Claim, action: &str) -> Result<(), DomainError> {
    if claim.has_any_role(&["admin", "teacher"]) {
        return Ok(());
    }
    tracing::warn!(
        username = %claim.username,
        action,
        "claim-level gate rejected caller roles {:?}",
        claim.roles
    );
    Err(DomainError::PermissionDenied(format!(
        "no permission to {action}; contact an administrator"
    )))
}

/// Authoritative gate for group-scoped mutations: the caller's *active*
/// membership row (under one of their resolved identity types) must carry
/// at least group-admin rights.
pub fn require_group_manager(
    conn: &Connection,
    group_id: &str,
    subject_id: i64,
    subject_types: &[MemberType],
) -> Result<MemberRole, DomainError> {
    match members::active_role_of(conn, group_id, subject_id, subject_types)? {
        Some(role) if role.can_manage_members() => Ok(role),
        _ => Err(DomainError::PermissionDenied(
            "caller is not an owner or admin of this group".into(),
        )),
    }
}

/// Owner-only actions: dissolving the group, appointing a new owner.
pub fn require_group_owner(
    conn: &Connection,
    group_id: &str,
    subject_id: i64,
    subject_types: &[MemberType],
) -> Result<(), DomainError> {
    match members::active_role_of(conn, group_id, subject_id, subject_types)? {
        Some(MemberRole::Owner) => Ok(()),
        _ => Err(DomainError::PermissionDenied(
            "only the group owner may do this".into(),
        )),
    }
}
