use rusqlite::Connection;

use crate::authz;
use crate::claims::{self, Claim};
use crate::error::DomainError;
use crate::identity::{self, MemberType};

/// Shared preamble for every state-mutating method: normalize the claim
/// param (tolerant, anonymous on parse failure), run the claim-level gate,
/// then re-validate the subject against the identity tables. The claim
/// alone is never trusted for anything durable.
pub fn authenticate(
    conn: &Connection,
    params: &serde_json::Value,
    action: &str,
) -> Result<(Claim, Vec<MemberType>), DomainError> {
    let claim = claims::normalize_claim(params.get("claim"));
    authz::require_claim_role(&claim, action)?;
    let matched = identity::resolve_caller(conn, &claim)?;
    Ok((claim, matched))
}

/// Highest-privilege identity the caller resolved to; the owner-membership
/// row written at group creation uses this as its member_type.
pub fn primary_type(matched: &[MemberType]) -> MemberType {
    *matched.first().unwrap_or(&MemberType::Student)
}
