//! Account recovery: backup code generation and the three-step reset flow.
//!
//! Each step is stateless and independently callable; the security property
//! rests entirely on the backup code and the short-lived reset token.

use axum::extract::{Json, State};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::handlers::auth::MessageResponse;
use crate::middleware::CurrentUser;
use crate::services::TokenPurpose;
use crate::utils::password::{hash_password, secrets_match};
use crate::AppState;
use service_core::error::AppError;

/// Backup codes older than this cannot start a reset.
const BACKUP_CODE_VALIDITY_HOURS: i64 = 24;

/// Uniformly random 6-digit zero-padded recovery code.
pub(crate) fn new_backup_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotStartRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotVerifyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotResetRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotStartResponse {
    pub found: bool,
}

#[derive(Debug, Serialize)]
pub struct ForgotVerifyResponse {
    pub reset_token: String,
}

#[derive(Debug, Serialize)]
pub struct BackupCodeResponse {
    pub code: String,
}

/// POST /api/users/generate-backup
///
/// Self-service generation of a fresh 6-digit backup code. Overwrites any
/// prior code.
pub async fn generate_backup(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<BackupCodeResponse>, AppError> {
    let code = new_backup_code();

    state.store.set_backup_code(user.id, &code, Utc::now()).await?;
    state.audit(Some(user.id), "Backup code generated".to_string());

    Ok(Json(BackupCodeResponse { code }))
}

/// POST /api/users/forgot/start
///
/// Always responds success-shaped. The `found` flag does reveal account
/// existence; kept for parity with the client flow that depends on it.
pub async fn forgot_start(
    State(state): State<AppState>,
    Json(req): Json<ForgotStartRequest>,
) -> Result<Json<ForgotStartResponse>, AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let found = state.store.find_account_by_email(&email).await?.is_some();

    Ok(Json(ForgotStartResponse { found }))
}

/// POST /api/users/forgot/verify
pub async fn forgot_verify(
    State(state): State<AppState>,
    Json(req): Json<ForgotVerifyRequest>,
) -> Result<Json<ForgotVerifyResponse>, AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let account = state
        .store
        .find_account_by_email(&email)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid credentials")))?;

    let (code, generated_at) = match (&account.backup_code, account.backup_code_generated_at) {
        (Some(code), Some(generated_at)) => (code, generated_at),
        _ => return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials"))),
    };

    if !secrets_match(&req.code, code) {
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid credentials")));
    }

    if Utc::now() > generated_at + Duration::hours(BACKUP_CODE_VALIDITY_HOURS) {
        return Err(AppError::Expired(anyhow::anyhow!("Backup code expired")));
    }

    let reset_token = state.jwt.issue_reset(account.id)?;
    state.audit(Some(account.id), "Password reset token issued".to_string());

    Ok(Json(ForgotVerifyResponse { reset_token }))
}

/// POST /api/users/forgot/reset
pub async fn forgot_reset(
    State(state): State<AppState>,
    Json(req): Json<ForgotResetRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let claims = state.jwt.verify(&req.token).map_err(|_| {
        AppError::AuthError(anyhow::anyhow!("Invalid or expired reset token"))
    })?;

    if claims.purpose != TokenPurpose::PasswordReset {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Invalid or expired reset token"
        )));
    }

    let account = state
        .store
        .find_account_by_id(claims.id)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid or expired reset token")))?;

    let password_hash = hash_password(&req.new_password)?;
    // One update: the consumed code must never outlive the old password.
    state.store.reset_password(account.id, &password_hash).await?;
    state.audit(Some(account.id), "Password reset completed".to_string());

    Ok(Json(MessageResponse {
        message: "Password has been reset".to_string(),
    }))
}
