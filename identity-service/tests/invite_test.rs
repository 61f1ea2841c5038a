mod common;

use chrono::{Duration, Utc};
use common::{unique_email, TestApp};
use identity_service::models::{InviteStatus, Role};
use identity_service::services::Store;

async fn submit_invite_request(app: &TestApp, email: &str, role: &str) -> i64 {
    let response = app
        .post_json(
            "/api/users/invite-request",
            serde_json::json!({
                "name": "Requester",
                "email": email,
                "requested_role": role,
                "message": "please elevate me",
            }),
            None,
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

async fn approve(app: &TestApp, admin_token: &str, id: i64) -> String {
    let response = app
        .put_json(
            &format!("/api/users/invite-requests/{}/approve", id),
            serde_json::json!({}),
            Some(admin_token),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn approve_and_redeem_round_trip() {
    let app = TestApp::spawn().await;
    let (admin_token, _) = app.admin().await;
    let email = unique_email("climber");
    let (user_token, user_id) = app
        .register_ok("Climber", &email, "password-123", None, None)
        .await;

    let request_id = submit_invite_request(&app, &email, "security_analyst").await;

    // Admin sees the pending request.
    let response = app.get("/api/users/invite-requests", Some(&admin_token)).await;
    assert_eq!(response.status(), 200);
    let list: serde_json::Value = response.json().await.unwrap();
    assert!(list
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["id"].as_i64() == Some(request_id)));

    let invite_token = approve(&app, &admin_token, request_id).await;
    // 24 random bytes, hex-encoded.
    assert_eq!(invite_token.len(), 48);

    let response = app
        .post_json(
            "/api/users/apply-invite",
            serde_json::json!({ "token": invite_token }),
            Some(&user_token),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["role"], "security_analyst");

    // Role updated in storage; the re-issued token reflects it.
    let account = app
        .state
        .store
        .find_account_by_id(user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.role, Some(Role::SecurityAnalyst));

    let new_token = body["token"].as_str().unwrap();
    let claims = app.state.jwt.verify(new_token).unwrap();
    assert_eq!(claims.role, Some(Role::SecurityAnalyst));

    // Single-use: the record's token is cleared.
    let record = app.store.invite_request(request_id).unwrap();
    assert_eq!(record.status, InviteStatus::Redeemed);
    assert!(record.token.is_none());
}

#[tokio::test]
async fn invite_token_is_single_use() {
    let app = TestApp::spawn().await;
    let (admin_token, _) = app.admin().await;
    let (user_token, _) = app
        .register_ok("Once", &unique_email("once"), "password-123", None, None)
        .await;

    let request_id = submit_invite_request(&app, &unique_email("req"), "security_analyst").await;
    let invite_token = approve(&app, &admin_token, request_id).await;

    let first = app
        .post_json(
            "/api/users/apply-invite",
            serde_json::json!({ "token": invite_token }),
            Some(&user_token),
        )
        .await;
    assert_eq!(first.status(), 200);

    let second = app
        .post_json(
            "/api/users/apply-invite",
            serde_json::json!({ "token": invite_token }),
            Some(&user_token),
        )
        .await;
    assert_eq!(second.status(), 400);
}

#[tokio::test]
async fn expired_invite_token_is_rejected() {
    let app = TestApp::spawn().await;
    let (admin_token, _) = app.admin().await;
    let (user_token, _) = app
        .register_ok("Late", &unique_email("late"), "password-123", None, None)
        .await;

    let request_id = submit_invite_request(&app, &unique_email("req"), "security_analyst").await;
    let invite_token = approve(&app, &admin_token, request_id).await;

    app.store
        .set_invite_token_expires_at(request_id, Utc::now() - Duration::seconds(1));

    let response = app
        .post_json(
            "/api/users/apply-invite",
            serde_json::json!({ "token": invite_token }),
            Some(&user_token),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn processing_is_pending_only() {
    let app = TestApp::spawn().await;
    let (admin_token, _) = app.admin().await;

    let request_id = submit_invite_request(&app, &unique_email("rej"), "admin").await;

    let response = app
        .put_json(
            &format!("/api/users/invite-requests/{}/reject", request_id),
            serde_json::json!({}),
            Some(&admin_token),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        app.store.invite_request(request_id).unwrap().status,
        InviteStatus::Rejected
    );

    // Approving a rejected request is a conflict.
    let response = app
        .put_json(
            &format!("/api/users/invite-requests/{}/approve", request_id),
            serde_json::json!({}),
            Some(&admin_token),
        )
        .await;
    assert_eq!(response.status(), 409);

    // Unknown request id is a 404.
    let response = app
        .put_json(
            "/api/users/invite-requests/999999/approve",
            serde_json::json!({}),
            Some(&admin_token),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn approval_requires_admin() {
    let app = TestApp::spawn().await;
    let (student_token, _) = app
        .register_ok("Student", &unique_email("stu"), "password-123", None, None)
        .await;

    let request_id = submit_invite_request(&app, &unique_email("req"), "admin").await;

    let response = app
        .put_json(
            &format!("/api/users/invite-requests/{}/approve", request_id),
            serde_json::json!({}),
            Some(&student_token),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = app.get("/api/users/invite-requests", Some(&student_token)).await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn registration_can_redeem_an_approved_invite() {
    let app = TestApp::spawn().await;
    let (admin_token, _) = app.admin().await;
    let email = unique_email("newadmin");

    let request_id = submit_invite_request(&app, &email, "admin").await;
    let invite_token = approve(&app, &admin_token, request_id).await;

    let (token, _id) = app
        .register_ok(
            "New Admin",
            &email,
            "password-123",
            Some("admin"),
            Some(&invite_token),
        )
        .await;

    let claims = app.state.jwt.verify(&token).unwrap();
    assert_eq!(claims.role, Some(Role::Admin));

    // Consumed at registration time.
    let record = app.store.invite_request(request_id).unwrap();
    assert_eq!(record.status, InviteStatus::Redeemed);
    assert!(record.token.is_none());
}

#[tokio::test]
async fn invite_requests_apply_only_to_privileged_roles() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/api/users/invite-request",
            serde_json::json!({
                "name": "Requester",
                "email": unique_email("req"),
                "requested_role": "student",
            }),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn authenticated_requester_is_recorded() {
    let app = TestApp::spawn().await;
    let (token, id) = app
        .register_ok("Asker", &unique_email("asker"), "password-123", None, None)
        .await;

    let response = app
        .post_json(
            "/api/users/invite-request",
            serde_json::json!({
                "name": "Asker",
                "email": unique_email("asker"),
                "requested_role": "security_analyst",
            }),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["requested_by"].as_i64(), Some(id));
}
