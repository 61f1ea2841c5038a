use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    UnderInvestigation,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::UnderInvestigation => "under_investigation",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "under_investigation" => Ok(IncidentStatus::UnderInvestigation),
            "resolved" => Ok(IncidentStatus::Resolved),
            _ => Err(format!("Invalid incident status: {}", s)),
        }
    }
}

/// A security-relevant event requiring human review.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: i64,
    pub description: String,
    pub status: IncidentStatus,
    pub reported_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Incident joined with the reporter's display name for list views.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    pub id: i64,
    pub description: String,
    pub status: IncidentStatus,
    pub reported_by: Option<i64>,
    pub reporter_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record. `actor_id` is null for pre-authentication
/// events such as lockout escalations.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Audit entry joined with the actor's display name for list views.
#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}
