//! Test helper module for identity-service integration tests.

#![allow(dead_code)]

use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, JwtConfig, LockoutConfig, SecurityConfig,
    },
    models::Role,
    services::{JwtService, LoginAttemptTracker, MemoryStore, Store},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const TEST_ADMIN_INVITE_CODE: &str = "test-admin-invite-code";
pub const TEST_SECURITY_INVITE_CODE: &str = "test-security-invite-code";
pub const TEST_JWT_SECRET: &str = "test-secret-test-secret-test-secret";

/// Test application running against an in-memory store.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn create_test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://localhost/identity_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_hours: 24,
            reset_token_expiry_minutes: 15,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_invite_code: TEST_ADMIN_INVITE_CODE.to_string(),
            security_invite_code: TEST_SECURITY_INVITE_CODE.to_string(),
            default_repair_role: Role::SecurityAnalyst,
        },
        lockout: LockoutConfig {
            max_attempts: 5,
            window_minutes: 30,
            sweep_interval_seconds: 300,
        },
    }
}

impl TestApp {
    /// Spawn the application on an ephemeral port with a fresh store.
    pub async fn spawn() -> Self {
        let config = create_test_config();
        let store = Arc::new(MemoryStore::new());
        let jwt = JwtService::new(&config.jwt);
        let login_tracker = Arc::new(LoginAttemptTracker::new(
            config.lockout.max_attempts,
            config.lockout.window_minutes,
        ));

        let state = AppState {
            config,
            store: store.clone() as Arc<dyn Store>,
            jwt,
            login_tracker,
        };

        let app = build_router(state.clone())
            .await
            .expect("Failed to build router");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            state,
            store,
        }
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        token: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self.client.post(format!("{}{}", self.address, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Request failed")
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: serde_json::Value,
        token: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self.client.put(format!("{}{}", self.address, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Request failed")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(format!("{}{}", self.address, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Request failed")
    }

    /// Register an account and return (token, user id).
    pub async fn register_ok(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
        invite_code: Option<&str>,
    ) -> (String, i64) {
        let response = self
            .post_json(
                "/api/users/register",
                serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": password,
                    "role": role,
                    "invite_code": invite_code,
                }),
                None,
            )
            .await;
        assert_eq!(response.status(), 201, "registration should succeed");

        let body: serde_json::Value = response.json().await.unwrap();
        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_i64().unwrap();
        (token, id)
    }

    /// Register a fresh admin via the static invite secret.
    pub async fn admin(&self) -> (String, i64) {
        self.register_ok(
            "Admin",
            &unique_email("admin"),
            "admin-password-1",
            Some("admin"),
            Some(TEST_ADMIN_INVITE_CODE),
        )
        .await
    }

    /// Register a fresh security analyst via the static invite secret.
    pub async fn security_analyst(&self) -> (String, i64) {
        self.register_ok(
            "Analyst",
            &unique_email("analyst"),
            "analyst-password-1",
            Some("security_analyst"),
            Some(TEST_SECURITY_INVITE_CODE),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/api/users/login",
            serde_json::json!({ "email": email, "password": password }),
            None,
        )
        .await
    }
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4())
}
