use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Account, AuditView, Incident, IncidentStatus, IncidentView, InviteRequest, Role,
};
use service_core::error::AppError;

/// Persistence seam for the identity core. The production implementation is
/// [`super::PgStore`]; tests use [`super::MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    // Accounts
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;
    async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, AppError>;
    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, AppError>;
    async fn update_role(&self, id: i64, role: Role) -> Result<u64, AppError>;
    /// Replace the password hash and clear the backup code in one atomic
    /// update, so a credential change always invalidates the recovery
    /// factor with it.
    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<u64, AppError>;
    async fn set_backup_code(
        &self,
        id: i64,
        code: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<u64, AppError>;
    /// One-time repair of legacy rows whose role is null or empty. Returns
    /// the number of rows repaired.
    async fn repair_empty_roles(&self, default_role: Role) -> Result<u64, AppError>;

    // Invite requests
    async fn create_invite_request(
        &self,
        name: &str,
        email: &str,
        requested_role: Role,
        message: Option<&str>,
        requested_by: Option<i64>,
    ) -> Result<InviteRequest, AppError>;
    async fn find_invite_request(&self, id: i64) -> Result<Option<InviteRequest>, AppError>;
    async fn list_invite_requests(&self, limit: i64) -> Result<Vec<InviteRequest>, AppError>;
    /// Transition pending -> approved, minting the one-time token. Returns
    /// 0 affected rows if the request is no longer pending.
    async fn approve_invite_request(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        processed_by: i64,
    ) -> Result<u64, AppError>;
    async fn reject_invite_request(&self, id: i64, processed_by: i64) -> Result<u64, AppError>;
    /// Atomically consume an approved, unexpired invite token and elevate
    /// the account's role to the request's target role. Returns the redeemed
    /// request, or None if no token matched.
    async fn redeem_invite_token(
        &self,
        token: &str,
        account_id: i64,
    ) -> Result<Option<InviteRequest>, AppError>;
    /// Registration-time redemption: consume a matching invite token and
    /// create the account with the requested role in one transaction.
    /// Returns None (and leaves the invite untouched) if no approved,
    /// unexpired, role-matching token exists.
    async fn create_account_with_invite(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        token: &str,
        requested_role: Role,
    ) -> Result<Option<Account>, AppError>;

    // Incidents and audit
    async fn create_incident(
        &self,
        description: &str,
        reported_by: Option<i64>,
    ) -> Result<Incident, AppError>;
    async fn list_incidents(&self, limit: i64) -> Result<Vec<IncidentView>, AppError>;
    async fn update_incident_status(
        &self,
        id: i64,
        status: IncidentStatus,
    ) -> Result<u64, AppError>;
    async fn record_audit(&self, actor_id: Option<i64>, action: &str) -> Result<(), AppError>;
    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditView>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
