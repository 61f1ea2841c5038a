mod common;

use common::{unique_email, TestApp};

#[tokio::test]
async fn incidents_are_reported_by_anyone_and_listed_by_security_roles() {
    let app = TestApp::spawn().await;
    let (student_token, student_id) = app
        .register_ok("Reporter", &unique_email("rep"), "password-123", None, None)
        .await;
    let (analyst_token, _) = app.security_analyst().await;

    let response = app
        .post_json(
            "/api/security/incidents",
            serde_json::json!({ "description": "Suspicious activity in the lab" }),
            Some(&student_token),
        )
        .await;
    assert_eq!(response.status(), 201);
    let incident: serde_json::Value = response.json().await.unwrap();
    assert_eq!(incident["reported_by"].as_i64(), Some(student_id));
    assert_eq!(incident["status"], "open");

    // Students cannot read the incident list.
    let response = app.get("/api/security/incidents", Some(&student_token)).await;
    assert_eq!(response.status(), 403);

    let response = app.get("/api/security/incidents", Some(&analyst_token)).await;
    assert_eq!(response.status(), 200);
    let list: serde_json::Value = response.json().await.unwrap();
    let found = list
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == incident["id"])
        .cloned()
        .unwrap();
    assert_eq!(found["reporter_name"], "Reporter");
}

#[tokio::test]
async fn incident_status_updates_use_the_closed_set() {
    let app = TestApp::spawn().await;
    let (analyst_token, _) = app.security_analyst().await;

    let response = app
        .post_json(
            "/api/security/incidents",
            serde_json::json!({ "description": "Needs triage" }),
            Some(&analyst_token),
        )
        .await;
    let incident: serde_json::Value = response.json().await.unwrap();
    let id = incident["id"].as_i64().unwrap();

    let response = app
        .put_json(
            &format!("/api/security/incidents/{}", id),
            serde_json::json!({ "status": "under_investigation" }),
            Some(&analyst_token),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Outside the allowed value set.
    let response = app
        .put_json(
            &format!("/api/security/incidents/{}", id),
            serde_json::json!({ "status": "shredded" }),
            Some(&analyst_token),
        )
        .await;
    assert!(response.status().is_client_error());

    let response = app
        .put_json(
            "/api/security/incidents/999999",
            serde_json::json!({ "status": "resolved" }),
            Some(&analyst_token),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn unauthorized_profile_view_creates_an_incident() {
    let app = TestApp::spawn().await;
    let (alice_token, alice_id) = app
        .register_ok("Alice", &unique_email("alice"), "password-123", None, None)
        .await;
    let (_bob_token, bob_id) = app
        .register_ok("Bob", &unique_email("bob"), "password-123", None, None)
        .await;

    // Self-view is fine.
    let response = app
        .get(&format!("/api/users/{}", alice_id), Some(&alice_token))
        .await;
    assert_eq!(response.status(), 200);

    // Peeking at another student is refused and recorded.
    let response = app
        .get(&format!("/api/users/{}", bob_id), Some(&alice_token))
        .await;
    assert_eq!(response.status(), 403);

    let incidents = app.store.incidents();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].reported_by, Some(alice_id));
    assert!(incidents[0].description.contains("Unauthorized profile access"));

    // Security roles may view anyone.
    let (analyst_token, _) = app.security_analyst().await;
    let response = app
        .get(&format!("/api/users/{}", bob_id), Some(&analyst_token))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn audit_log_lists_security_events_with_actor_names() {
    let app = TestApp::spawn().await;
    let (alice_token, alice_id) = app
        .register_ok("Alice", &unique_email("alice"), "password-123", None, None)
        .await;
    let (_bob_token, bob_id) = app
        .register_ok("Bob", &unique_email("bob"), "password-123", None, None)
        .await;

    // Synchronous security audit entry.
    app.get(&format!("/api/users/{}", bob_id), Some(&alice_token))
        .await;

    let (analyst_token, _) = app.security_analyst().await;
    let response = app.get("/api/security/audit-logs", Some(&analyst_token)).await;
    assert_eq!(response.status(), 200);

    let list: serde_json::Value = response.json().await.unwrap();
    let entry = list
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"].as_str() == Some("Unauthorized profile access attempt"))
        .cloned()
        .unwrap();
    assert_eq!(entry["actor_id"].as_i64(), Some(alice_id));
    assert_eq!(entry["actor_name"], "Alice");
}
