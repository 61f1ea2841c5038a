//! Invite/elevation workflow: request, approve or reject, redeem.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::handlers::auth::MessageResponse;
use crate::handlers::LIST_LIMIT;
use crate::middleware::{CurrentUser, OptionalUser};
use crate::models::{InviteRequest, InviteStatus, Role};
use crate::AppState;
use service_core::error::AppError;

const INVITE_TOKEN_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub requested_role: Role,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyInviteRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ApproveInviteResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApplyInviteResponse {
    pub token: String,
    pub role: Role,
}

/// One-time redemption token: 24 random bytes, hex-encoded.
fn generate_invite_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// POST /api/users/invite-request
///
/// Open to anonymous and authenticated callers alike; always audited.
pub async fn create_invite_request(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteRequest>), AppError> {
    req.validate()?;

    if !req.requested_role.is_privileged() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invite requests apply only to privileged roles"
        )));
    }

    let email = req.email.trim().to_lowercase();
    let requested_by = user.as_ref().map(|u| u.id);

    let invite = state
        .store
        .create_invite_request(
            req.name.trim(),
            &email,
            req.requested_role,
            req.message.as_deref(),
            requested_by,
        )
        .await?;

    state.audit(
        requested_by,
        format!(
            "Invite request submitted for {} as {}",
            email, req.requested_role
        ),
    );

    Ok((StatusCode::CREATED, Json(invite)))
}

/// GET /api/users/invite-requests (admin only)
pub async fn list_invite_requests(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<InviteRequest>>, AppError> {
    user.require(&[Role::Admin])?;

    let invites = state.store.list_invite_requests(LIST_LIMIT).await?;
    Ok(Json(invites))
}

/// PUT /api/users/invite-requests/:id/approve (admin only)
///
/// Mints the one-time token and returns it to the approver, who delivers it
/// out-of-band. Nothing is emailed by this service.
pub async fn approve_invite_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApproveInviteResponse>, AppError> {
    user.require(&[Role::Admin])?;

    let invite = state
        .store
        .find_invite_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invite request not found")))?;

    if invite.status != InviteStatus::Pending {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invite request already processed"
        )));
    }

    let token = generate_invite_token();
    let expires_at = Utc::now() + Duration::days(INVITE_TOKEN_EXPIRY_DAYS);

    let affected = state
        .store
        .approve_invite_request(id, &token, expires_at, user.id)
        .await?;
    if affected == 0 {
        // Lost a race with another approver.
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invite request already processed"
        )));
    }

    state.audit(
        Some(user.id),
        format!("Invite request {} approved for {}", id, invite.email),
    );

    Ok(Json(ApproveInviteResponse { token, expires_at }))
}

/// PUT /api/users/invite-requests/:id/reject (admin only)
pub async fn reject_invite_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;

    let invite = state
        .store
        .find_invite_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invite request not found")))?;

    if invite.status != InviteStatus::Pending {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invite request already processed"
        )));
    }

    let affected = state.store.reject_invite_request(id, user.id).await?;
    if affected == 0 {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invite request already processed"
        )));
    }

    state.audit(
        Some(user.id),
        format!("Invite request {} rejected for {}", id, invite.email),
    );

    Ok(Json(MessageResponse {
        message: "Invite request rejected".to_string(),
    }))
}

/// POST /api/users/apply-invite
///
/// Consumes an approved invite token, elevates the caller's role, and
/// re-issues an access token reflecting the new role.
pub async fn apply_invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ApplyInviteRequest>,
) -> Result<Json<ApplyInviteResponse>, AppError> {
    req.validate()?;

    let redeemed = state
        .store
        .redeem_invite_token(&req.token, user.id)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Invalid or expired invite token"))
        })?;

    let role = redeemed.requested_role;
    let token = state.jwt.issue_access(user.id, &user.email, role, &user.name)?;

    state.audit(
        Some(user.id),
        format!("Invite redeemed, role elevated to {}", role),
    );

    Ok(Json(ApplyInviteResponse { token, role }))
}
