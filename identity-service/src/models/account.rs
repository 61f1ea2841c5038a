use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of account roles. Stored as text; parsed at every boundary so
/// an unknown string can never flow past the model layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    SecurityAnalyst,
    Admin,
}

/// Roles that require an invite secret or an approved invite request.
pub const PRIVILEGED_ROLES: [Role; 2] = [Role::SecurityAnalyst, Role::Admin];

/// Roles allowed to view incidents and audit logs.
pub const SECURITY_ROLES: [Role; 2] = [Role::SecurityAnalyst, Role::Admin];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::SecurityAnalyst => "security_analyst",
            Role::Admin => "admin",
        }
    }

    pub fn is_privileged(&self) -> bool {
        PRIVILEGED_ROLES.contains(self)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "security_analyst" => Ok(Role::SecurityAnalyst),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account row. `role` is `None` only for legacy rows that predate the
/// role column being mandatory; readers must repair it before use.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Option<Role>,
    pub backup_code: Option<String>,
    pub backup_code_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Account shape safe to return to callers (no credential material).
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Self-profile shape: like [`AccountView`] but including the recovery
/// fields, which only the account's owner may see.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub backup_code: Option<String>,
    pub backup_code_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn view(&self, role: Role) -> AccountView {
        AccountView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role,
            created_at: self.created_at,
        }
    }

    pub fn profile_view(&self, role: Role) -> ProfileView {
        ProfileView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role,
            backup_code: self.backup_code.clone(),
            backup_code_generated_at: self.backup_code_generated_at,
            created_at: self.created_at,
        }
    }
}
