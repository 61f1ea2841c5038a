//! Access control guard.
//!
//! Resolves the bearer credential to a live identity. The role attached to
//! the request always comes from storage, never from the token, so role
//! downgrades take effect without waiting for token expiry.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::config::Environment;
use crate::models::Role;
use crate::services::TokenPurpose;
use crate::AppState;
use service_core::error::AppError;

/// Identity attached to the request context after authentication.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    /// Composable authorization step: passes when the resolved role is in
    /// the allowed set, otherwise fails with the required set and current
    /// role in the error payload.
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::InsufficientRole {
                required: allowed.iter().map(|r| r.to_string()).collect(),
                current: self.role.to_string(),
            })
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let raw = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication required")))?;

    let user = resolve_user(&state, raw).await?;

    // Request trail for authenticated traffic.
    state.audit(
        Some(user.id),
        format!("{} {}", req.method(), req.uri().path()),
    );

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Guard variant for endpoints that accept anonymous callers. A resolvable
/// credential attaches an identity; anything else leaves the request
/// anonymous rather than failing it.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let raw = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if let Some(raw) = raw {
        if let Ok(user) = resolve_user(&state, &raw).await {
            req.extensions_mut().insert(user);
        }
    }

    next.run(req).await
}

async fn resolve_user(state: &AppState, raw: &str) -> Result<CurrentUser, AppError> {
    // The credential is accepted bare or with a "Bearer " prefix.
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);

    let claims = state.jwt.verify(token).map_err(|e| {
        if state.config.environment == Environment::Dev {
            AppError::AuthError(anyhow::anyhow!("{}", e))
        } else {
            AppError::AuthError(anyhow::anyhow!("Invalid or expired token"))
        }
    })?;

    // Reset tokens authorize exactly one password change, nothing else.
    if claims.purpose != TokenPurpose::Access {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Invalid or expired token"
        )));
    }

    let account = state
        .store
        .find_account_by_id(claims.id)
        .await?
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Account no longer exists")))?;

    // Startup repair should leave no empty roles behind; this is a last
    // line of defense against rows written by legacy tooling since then.
    let role = state.effective_role(&account).await?;

    Ok(CurrentUser {
        id: account.id,
        name: account.name,
        email: account.email,
        role,
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Authentication required")))
    }
}

/// Extractor for endpoints behind [`optional_auth_middleware`].
pub struct OptionalUser(pub Option<CurrentUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}
