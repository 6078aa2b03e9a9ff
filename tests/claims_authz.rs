
use serde_json::json;
use test_support::{bootstrap_admin, claim, create_user, error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn missing_or_garbage_claim_is_anonymous_and_denied() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-anon");
    let _admin = bootstrap_admin(&mut stdin, &mut reader, &ws);

    let resp = request(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "groupName": "NoClaim" }),
    );
    assert_eq!(error_code(&resp), "permission_denied");
    assert_eq!(resp.get("status").and_then(|v| v.as_i64()), Some(403));

    let resp = request(
        &mut stdin,
        &mut reader,
        "c2",
        "groups.create",
        json!({ "claim": "definitely not json", "groupName": "Garbage" }),
    );
    assert_eq!(error_code(&resp), "permission_denied");
}

#[test]
fn string_and_url_encoded_claims_are_accepted() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-enc");
    let admin = bootstrap_admin(&mut stdin, &mut reader, &ws);
    let admin_id = admin.get("sub").and_then(|v| v.as_i64()).unwrap();

    // Same claim serialized as a plain JSON string.
    let as_string = serde_json::to_string(&admin).unwrap();
    request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "claim": as_string, "groupName": "FromString" }),
    );

    // And percent-encoded, the way a query-string transport would send it.
    let encoded = format!(
        "%7B%22sub%22%3A{admin_id}%2C%22username%22%3A%22root%22%2C%22roles%22%3A%5B%22admin%22%5D%7D"
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "c2",
        "groups.create",
        json!({ "claim": encoded, "groupName": "FromEncoded" }),
    );
}

#[test]
fn capitalized_plural_role_tags_normalize() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-tags");
    let admin = bootstrap_admin(&mut stdin, &mut reader, &ws);
    let admin_id = admin.get("sub").and_then(|v| v.as_i64()).unwrap();

    let tagged = claim(admin_id, "root", &["Admins"]);
    request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "claim": tagged, "groupName": "Tagged" }),
    );
}

#[test]
fn forged_admin_claim_fails_identity_revalidation() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-forged");
    let _admin = bootstrap_admin(&mut stdin, &mut reader, &ws);

    // Declared roles pass the coarse gate; the identity tables do not know
    // this subject, so the mutation is refused.
    let forged = claim(9999, "ghost", &["admin"]);
    let resp = request(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "claim": forged, "groupName": "Forged" }),
    );
    assert_eq!(error_code(&resp), "identity_not_found");
    assert_eq!(resp.get("status").and_then(|v| v.as_i64()), Some(403));

    let resp = request(
        &mut stdin,
        &mut reader,
        "c2",
        "groups.create",
        json!({ "claim": claim(0, "zero", &["admin"]), "groupName": "Zero" }),
    );
    assert_eq!(error_code(&resp), "identity_not_found");
}

#[test]
fn student_role_claim_is_denied_at_the_claim_gate() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-student");
    let _admin = bootstrap_admin(&mut stdin, &mut reader, &ws);
    let sid = create_user(&mut stdin, &mut reader, "u1", "student", "S001", "Alice");

    // A perfectly real student still may not create groups.
    let student_claim = claim(sid, "S001", &["student"]);
    let resp = request(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "claim": student_claim, "groupName": "StudentRun" }),
    );
    assert_eq!(error_code(&resp), "permission_denied");
}

#[test]
fn declared_tags_constrain_identity_resolution() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ws = temp_dir("groupsd-claims-mismatch");
    let _admin = bootstrap_admin(&mut stdin, &mut reader, &ws);
    let sid = create_user(&mut stdin, &mut reader, "u1", "student", "S001", "Alice");

    // Claiming teacher for a subject that only exists as a student: the
    // coarse gate passes, resolution against the teachers table does not.
    let mismatched = claim(sid, "S001", &["teacher"]);
    let resp = request(
        &mut stdin,
        &mut reader,
        "c1",
        "groups.create",
        json!({ "claim": mismatched, "groupName": "Mismatch" }),
    );
    assert_eq!(error_code(&resp), "identity_not_found");
}
