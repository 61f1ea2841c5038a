use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::Store;
use crate::models::{
    Account, AuditEntry, AuditView, Incident, IncidentStatus, IncidentView, InviteRequest,
    InviteStatus, Role,
};
use service_core::error::AppError;

/// In-memory [`Store`] for tests and local experimentation. Mirrors the
/// transactional semantics of [`super::PgStore`] under a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    invites: Vec<InviteRequest>,
    incidents: Vec<Incident>,
    audit: Vec<AuditEntry>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Test inspection helpers.

    pub fn incidents(&self) -> Vec<Incident> {
        self.inner.lock().unwrap().incidents.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().audit.clone()
    }

    pub fn invite_request(&self, id: i64) -> Option<InviteRequest> {
        self.inner
            .lock()
            .unwrap()
            .invites
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    pub fn account_by_email(&self, email: &str) -> Option<Account> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.email == email)
            .cloned()
    }

    /// Directly overwrite an account's role, including to `None`, to model
    /// legacy data defects.
    pub fn set_account_role(&self, id: i64, role: Option<Role>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.iter_mut().find(|a| a.id == id) {
            account.role = role;
        }
    }

    /// Backdate an approved invite token's expiry.
    pub fn set_invite_token_expires_at(&self, id: i64, expires_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(invite) = inner.invites.iter_mut().find(|i| i.id == id) {
            invite.token_expires_at = Some(expires_at);
        }
    }

    /// Backdate a backup code's generation timestamp.
    pub fn set_backup_code_generated_at(&self, id: i64, generated_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.iter_mut().find(|a| a.id == id) {
            account.backup_code_generated_at = Some(generated_at);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self.account_by_email(email))
    }

    async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.iter().any(|a| a.email == email) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An account with this email already exists"
            )));
        }
        let account = Account {
            id: inner.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Some(role),
            backup_code: None,
            backup_code_generated_at: None,
            created_at: Utc::now(),
        };
        inner.accounts.push(account.clone());
        Ok(account)
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.accounts.iter_mut().find(|a| a.id == id) {
            Some(account) => {
                account.role = Some(role);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.accounts.iter_mut().find(|a| a.id == id) {
            Some(account) => {
                account.password_hash = password_hash.to_string();
                account.backup_code = None;
                account.backup_code_generated_at = None;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_backup_code(
        &self,
        id: i64,
        code: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.accounts.iter_mut().find(|a| a.id == id) {
            Some(account) => {
                account.backup_code = Some(code.to_string());
                account.backup_code_generated_at = Some(generated_at);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn repair_empty_roles(&self, default_role: Role) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut repaired = 0;
        for account in inner.accounts.iter_mut() {
            if account.role.is_none() {
                account.role = Some(default_role);
                repaired += 1;
            }
        }
        Ok(repaired)
    }

    async fn create_invite_request(
        &self,
        name: &str,
        email: &str,
        requested_role: Role,
        message: Option<&str>,
        requested_by: Option<i64>,
    ) -> Result<InviteRequest, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let invite = InviteRequest {
            id: inner.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            requested_role,
            message: message.map(|m| m.to_string()),
            status: InviteStatus::Pending,
            token: None,
            token_expires_at: None,
            requested_by,
            processed_by: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        inner.invites.push(invite.clone());
        Ok(invite)
    }

    async fn find_invite_request(&self, id: i64) -> Result<Option<InviteRequest>, AppError> {
        Ok(self.invite_request(id))
    }

    async fn list_invite_requests(&self, limit: i64) -> Result<Vec<InviteRequest>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut invites = inner.invites.clone();
        invites.sort_by(|a, b| b.id.cmp(&a.id));
        invites.truncate(limit as usize);
        Ok(invites)
    }

    async fn approve_invite_request(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        processed_by: i64,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .invites
            .iter_mut()
            .find(|i| i.id == id && i.status == InviteStatus::Pending)
        {
            Some(invite) => {
                invite.status = InviteStatus::Approved;
                invite.token = Some(token.to_string());
                invite.token_expires_at = Some(expires_at);
                invite.processed_by = Some(processed_by);
                invite.processed_at = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn reject_invite_request(&self, id: i64, processed_by: i64) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .invites
            .iter_mut()
            .find(|i| i.id == id && i.status == InviteStatus::Pending)
        {
            Some(invite) => {
                invite.status = InviteStatus::Rejected;
                invite.token = None;
                invite.token_expires_at = None;
                invite.processed_by = Some(processed_by);
                invite.processed_at = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn redeem_invite_token(
        &self,
        token: &str,
        account_id: i64,
    ) -> Result<Option<InviteRequest>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let Some(invite) = inner.invites.iter_mut().find(|i| {
            i.status == InviteStatus::Approved
                && i.token.as_deref() == Some(token)
                && i.token_expires_at.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };

        invite.status = InviteStatus::Redeemed;
        invite.token = None;
        let redeemed = invite.clone();

        match inner.accounts.iter_mut().find(|a| a.id == account_id) {
            Some(account) => account.role = Some(redeemed.requested_role),
            None => return Err(AppError::NotFound(anyhow::anyhow!("Account not found"))),
        }

        Ok(Some(redeemed))
    }

    async fn create_account_with_invite(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        token: &str,
        requested_role: Role,
    ) -> Result<Option<Account>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        if inner.accounts.iter().any(|a| a.email == email) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An account with this email already exists"
            )));
        }

        let Some(invite) = inner.invites.iter_mut().find(|i| {
            i.status == InviteStatus::Approved
                && i.token.as_deref() == Some(token)
                && i.token_expires_at.is_some_and(|exp| exp > now)
                && i.requested_role == requested_role
        }) else {
            return Ok(None);
        };

        invite.status = InviteStatus::Redeemed;
        invite.token = None;

        let account = Account {
            id: inner.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Some(requested_role),
            backup_code: None,
            backup_code_generated_at: None,
            created_at: now,
        };
        inner.accounts.push(account.clone());
        Ok(Some(account))
    }

    async fn create_incident(
        &self,
        description: &str,
        reported_by: Option<i64>,
    ) -> Result<Incident, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let incident = Incident {
            id: inner.next_id(),
            description: description.to_string(),
            status: IncidentStatus::Open,
            reported_by,
            created_at: Utc::now(),
        };
        inner.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn list_incidents(&self, limit: i64) -> Result<Vec<IncidentView>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut incidents: Vec<IncidentView> = inner
            .incidents
            .iter()
            .map(|i| IncidentView {
                id: i.id,
                description: i.description.clone(),
                status: i.status,
                reported_by: i.reported_by,
                reporter_name: i.reported_by.and_then(|id| {
                    inner
                        .accounts
                        .iter()
                        .find(|a| a.id == id)
                        .map(|a| a.name.clone())
                }),
                created_at: i.created_at,
            })
            .collect();
        incidents.sort_by(|a, b| b.id.cmp(&a.id));
        incidents.truncate(limit as usize);
        Ok(incidents)
    }

    async fn update_incident_status(
        &self,
        id: i64,
        status: IncidentStatus,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.incidents.iter_mut().find(|i| i.id == id) {
            Some(incident) => {
                incident.status = status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn record_audit(&self, actor_id: Option<i64>, action: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = AuditEntry {
            id: inner.next_id(),
            actor_id,
            action: action.to_string(),
            created_at: Utc::now(),
        };
        inner.audit.push(entry);
        Ok(())
    }

    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditView>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<AuditView> = inner
            .audit
            .iter()
            .map(|e| AuditView {
                id: e.id,
                actor_id: e.actor_id,
                actor_name: e.actor_id.and_then(|id| {
                    inner
                        .accounts
                        .iter()
                        .find(|a| a.id == id)
                        .map(|a| a.name.clone())
                }),
                action: e.action.clone(),
                created_at: e.created_at,
            })
            .collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
