//! Incident reporting and audit-log access.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use crate::handlers::auth::MessageResponse;
use crate::handlers::LIST_LIMIT;
use crate::middleware::CurrentUser;
use crate::models::{AuditView, Incident, IncidentStatus, IncidentView, SECURITY_ROLES};
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct ReportIncidentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIncidentRequest {
    pub status: IncidentStatus,
}

/// POST /api/security/incidents
///
/// Any authenticated account may report an incident.
pub async fn report_incident(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ReportIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>), AppError> {
    req.validate()?;

    let incident = state
        .store
        .create_incident(req.description.trim(), Some(user.id))
        .await?;

    state.audit(Some(user.id), format!("Incident {} reported", incident.id));

    Ok((StatusCode::CREATED, Json(incident)))
}

/// GET /api/security/incidents (security roles only)
pub async fn list_incidents(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<IncidentView>>, AppError> {
    user.require(&SECURITY_ROLES)?;

    let incidents = state.store.list_incidents(LIST_LIMIT).await?;
    Ok(Json(incidents))
}

/// PUT /api/security/incidents/:id (security roles only)
pub async fn update_incident(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateIncidentRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&SECURITY_ROLES)?;

    let affected = state.store.update_incident_status(id, req.status).await?;
    if affected == 0 {
        return Err(AppError::NotFound(anyhow::anyhow!("Incident not found")));
    }

    state.audit(
        Some(user.id),
        format!("Incident {} marked {}", id, req.status.as_str()),
    );

    Ok(Json(MessageResponse {
        message: "Incident updated".to_string(),
    }))
}

/// GET /api/security/audit-logs (security roles only)
pub async fn list_audit_log(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<AuditView>>, AppError> {
    user.require(&SECURITY_ROLES)?;

    let entries = state.store.list_audit_log(LIST_LIMIT).await?;
    Ok(Json(entries))
}
