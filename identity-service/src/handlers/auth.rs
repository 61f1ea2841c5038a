//! Registration, login, and account management handlers.

use axum::{
    extract::{ConnectInfo, Json, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::handlers::recovery::new_backup_code;
use crate::middleware::CurrentUser;
use crate::models::{AccountView, ProfileView, Role, SECURITY_ROLES};
use crate::utils::password::{hash_password, secrets_match, verify_password};
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub role: Option<Role>,
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /api/users/register
///
/// Registering directly as a privileged role requires either the static
/// per-role invite secret or an approved invite-request token; the latter is
/// redeemed atomically with account creation.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    req.validate()?;

    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let role = req.role.unwrap_or(Role::Student);
    let password_hash = hash_password(&req.password)?;

    let account = if let Some(static_secret) = state.config.security.static_invite_code(role) {
        let invite_code = req.invite_code.as_deref().unwrap_or_default();
        if !invite_code.is_empty() && secrets_match(invite_code, static_secret) {
            state
                .store
                .create_account(&name, &email, &password_hash, role)
                .await?
        } else {
            // Not the shared secret; it may be an approved invite token.
            match state
                .store
                .create_account_with_invite(&name, &email, &password_hash, invite_code, role)
                .await?
            {
                Some(account) => account,
                None => {
                    state.audit(
                        None,
                        format!("Rejected privileged registration for {} as {}", email, role),
                    );
                    return Err(AppError::Forbidden(anyhow::anyhow!(
                        "A valid invite is required to register as {}",
                        role
                    )));
                }
            }
        }
    } else {
        state
            .store
            .create_account(&name, &email, &password_hash, role)
            .await?
    };

    // Seed the recovery factor so the account can be recovered before the
    // owner ever visits the backup-code endpoint. Failure is non-fatal.
    let code = new_backup_code();
    if let Err(e) = state.store.set_backup_code(account.id, &code, Utc::now()).await {
        tracing::warn!(error = %e, account_id = account.id, "Failed to store initial backup code");
    } else {
        state.audit(Some(account.id), "Backup code generated".to_string());
    }

    let token = state.jwt.issue_access(account.id, &account.email, role, &account.name)?;
    state.audit(
        Some(account.id),
        format!("Account registered: {} ({})", account.email, role),
    );

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: account.view(role),
        }),
    ))
}

/// POST /api/users/login
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();

    // Unknown accounts are deliberately not fed into the tracker, so failure
    // volume cannot be used to probe for account existence.
    let Some(account) = state.store.find_account_by_email(&email).await? else {
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials")));
    };

    if !verify_password(&req.password, &account.password_hash)? {
        let origin = addr.ip().to_string();
        if state.login_tracker.record_failure(&email, &origin) {
            let origins = state.login_tracker.recent_origins(&email).join(", ");
            state
                .store
                .create_incident(
                    &format!(
                        "Repeated failed login attempts for {} (origins: {})",
                        email, origins
                    ),
                    None,
                )
                .await?;
            // Pre-authentication event: no actor.
            state
                .store
                .record_audit(
                    None,
                    &format!("Failed login threshold exceeded for {}", email),
                )
                .await?;
        }
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials")));
    }

    state.login_tracker.clear(&email);

    let role = state.effective_role(&account).await?;
    let token = state.jwt.issue_access(account.id, &account.email, role, &account.name)?;
    state.audit(Some(account.id), format!("Logged in: {}", account.email));

    Ok(Json(AuthResponse {
        token,
        user: account.view(role),
    }))
}

/// GET /api/users/profile
///
/// Self-view, so the recovery fields are included.
pub async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let account = state
        .store
        .find_account_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    Ok(Json(account.profile_view(user.role)))
}

/// POST /api/users/change-password
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let account = state
        .store
        .find_account_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    if !verify_password(&req.current_password, &account.password_hash)? {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Current password is incorrect"
        )));
    }

    let password_hash = hash_password(&req.new_password)?;
    // One update: credential changes invalidate the recovery factor.
    state.store.reset_password(user.id, &password_hash).await?;
    state.audit(Some(user.id), "Password changed".to_string());

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// PUT /api/users/:id/role (admin only)
pub async fn update_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;

    let affected = state.store.update_role(id, req.role).await?;
    if affected == 0 {
        return Err(AppError::NotFound(anyhow::anyhow!("Account not found")));
    }

    state.audit(
        Some(user.id),
        format!("Role of account {} set to {}", id, req.role),
    );

    Ok(Json(MessageResponse {
        message: "Role updated".to_string(),
    }))
}

/// GET /api/users/:id
///
/// Callers may view their own profile; security roles may view anyone.
/// Anything else is treated as a probe: recorded as an incident and audited
/// before the request is refused.
pub async fn view_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<AccountView>, AppError> {
    if user.id != id && !SECURITY_ROLES.contains(&user.role) {
        state
            .store
            .create_incident(
                &format!(
                    "Unauthorized profile access attempt by account {} targeting account {}",
                    user.id, id
                ),
                Some(user.id),
            )
            .await?;
        state
            .store
            .record_audit(Some(user.id), "Unauthorized profile access attempt")
            .await?;
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to view this profile"
        )));
    }

    let account = state
        .store
        .find_account_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    let role = state.effective_role(&account).await?;
    Ok(Json(account.view(role)))
}
