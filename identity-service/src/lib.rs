pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::models::{Account, Role};
use crate::services::{JwtService, LoginAttemptTracker, Store};
use service_core::error::AppError;
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn Store>,
    pub jwt: JwtService,
    pub login_tracker: Arc<LoginAttemptTracker>,
}

impl AppState {
    /// Fire-and-forget audit write. Audit failures are logged and never
    /// block the primary operation.
    pub fn audit(&self, actor_id: Option<i64>, action: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.record_audit(actor_id, &action).await {
                tracing::error!(error = %e, action = %action, "Failed to write audit entry");
            }
        });
    }

    /// Canonical role for an account, repairing a legacy empty role in
    /// place. Startup repair should make the fallback unreachable.
    pub async fn effective_role(&self, account: &Account) -> Result<Role, AppError> {
        match account.role {
            Some(role) => Ok(role),
            None => {
                let default_role = self.config.security.default_repair_role;
                tracing::warn!(
                    account_id = account.id,
                    role = %default_role,
                    "Repairing empty account role"
                );
                self.store.update_role(account.id, default_role).await?;
                Ok(default_role)
            }
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route("/api/users/register", post(handlers::auth::register))
        .route("/api/users/login", post(handlers::auth::login))
        .route(
            "/api/users/forgot/start",
            post(handlers::recovery::forgot_start),
        )
        .route(
            "/api/users/forgot/verify",
            post(handlers::recovery::forgot_verify),
        )
        .route(
            "/api/users/forgot/reset",
            post(handlers::recovery::forgot_reset),
        );

    // Invite requests accept anonymous callers.
    let invite_request_route = Router::new()
        .route(
            "/api/users/invite-request",
            post(handlers::invites::create_invite_request),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::optional_auth_middleware,
        ));

    let protected_routes = Router::new()
        .route("/api/users/profile", get(handlers::auth::profile))
        .route(
            "/api/users/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/api/users/generate-backup",
            post(handlers::recovery::generate_backup),
        )
        .route(
            "/api/users/apply-invite",
            post(handlers::invites::apply_invite),
        )
        .route(
            "/api/users/invite-requests",
            get(handlers::invites::list_invite_requests),
        )
        .route(
            "/api/users/invite-requests/:id/approve",
            put(handlers::invites::approve_invite_request),
        )
        .route(
            "/api/users/invite-requests/:id/reject",
            put(handlers::invites::reject_invite_request),
        )
        .route("/api/users/:id/role", put(handlers::auth::update_role))
        .route("/api/users/:id", get(handlers::auth::view_user))
        .route(
            "/api/security/incidents",
            post(handlers::security::report_incident)
                .get(handlers::security::list_incidents),
        )
        .route(
            "/api/security/incidents/:id",
            put(handlers::security::update_incident),
        )
        .route(
            "/api/security/audit-logs",
            get(handlers::security::list_audit_log),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>().unwrap_or_else(|e| {
                        tracing::error!("Invalid CORS origin '{}': {}. Using fallback.", o, e);
                        HeaderValue::from_static("*")
                    })
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(invite_request_route)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
