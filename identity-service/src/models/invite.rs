use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a role-elevation request.
///
/// `pending -> approved -> redeemed`, or `pending -> rejected`.
/// `redeemed` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Approved,
    Redeemed,
    Rejected,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Approved => "approved",
            InviteStatus::Redeemed => "redeemed",
            InviteStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "approved" => Ok(InviteStatus::Approved),
            "redeemed" => Ok(InviteStatus::Redeemed),
            "rejected" => Ok(InviteStatus::Rejected),
            _ => Err(format!("Invalid invite status: {}", s)),
        }
    }
}

/// A request to elevate an account to a privileged role.
///
/// `token` is non-null only while the request is approved and unredeemed;
/// redemption and rejection both clear it.
#[derive(Debug, Clone, Serialize)]
pub struct InviteRequest {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub requested_role: super::Role,
    pub message: Option<String>,
    pub status: InviteStatus,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub requested_by: Option<i64>,
    pub processed_by: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
