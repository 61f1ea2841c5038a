use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use super::Store;
use crate::models::{
    Account, AuditView, Incident, IncidentStatus, IncidentView, InviteRequest, InviteStatus, Role,
};
use service_core::error::AppError;

/// PostgreSQL-backed credential and security store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(err: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::Error::new(err))
}

fn parse_stored<T>(raw: &str, what: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        AppError::DatabaseError(anyhow::anyhow!("Corrupt {} in storage: {}", what, e))
    })
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: Option<String>,
    backup_code: Option<String>,
    backup_code_generated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Result<Account, AppError> {
        let role = match self.role.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_stored::<Role>(raw, "role")?),
        };
        Ok(Account {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            backup_code: self.backup_code,
            backup_code_generated_at: self.backup_code_generated_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InviteRow {
    id: i64,
    name: String,
    email: String,
    requested_role: String,
    message: Option<String>,
    status: String,
    token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    requested_by: Option<i64>,
    processed_by: Option<i64>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl InviteRow {
    fn into_invite(self) -> Result<InviteRequest, AppError> {
        Ok(InviteRequest {
            id: self.id,
            name: self.name,
            email: self.email,
            requested_role: parse_stored(&self.requested_role, "requested role")?,
            message: self.message,
            status: parse_stored::<InviteStatus>(&self.status, "invite status")?,
            token: self.token,
            token_expires_at: self.token_expires_at,
            requested_by: self.requested_by,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IncidentRow {
    id: i64,
    description: String,
    status: String,
    reported_by: Option<i64>,
    created_at: DateTime<Utc>,
}

impl IncidentRow {
    fn into_incident(self) -> Result<Incident, AppError> {
        Ok(Incident {
            id: self.id,
            description: self.description,
            status: parse_stored::<IncidentStatus>(&self.status, "incident status")?,
            reported_by: self.reported_by,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IncidentViewRow {
    id: i64,
    description: String,
    status: String,
    reported_by: Option<i64>,
    reporter_name: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AuditViewRow {
    id: i64,
    actor_id: Option<i64>,
    actor_name: Option<String>,
    action: String,
    created_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str =
    "id, name, email, password_hash, role, backup_code, backup_code_generated_at, created_at";

const INVITE_COLUMNS: &str = "id, name, email, requested_role, message, status, token, \
     token_expires_at, requested_by, processed_by, processed_at, created_at";

#[async_trait]
impl Store for PgStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE email = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, AppError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, AppError> {
        let row: AccountRow = sqlx::query_as(&format!(
            "INSERT INTO accounts (name, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("An account with this email already exists"))
            }
            _ => db_err(e),
        })?;

        row.into_account()
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE accounts SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE accounts
             SET password_hash = $1, backup_code = NULL, backup_code_generated_at = NULL
             WHERE id = $2",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn set_backup_code(
        &self,
        id: i64,
        code: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE accounts SET backup_code = $1, backup_code_generated_at = $2 WHERE id = $3",
        )
        .bind(code)
        .bind(generated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn repair_empty_roles(&self, default_role: Role) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE accounts SET role = $1 WHERE role IS NULL OR role = ''")
            .bind(default_role.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn create_invite_request(
        &self,
        name: &str,
        email: &str,
        requested_role: Role,
        message: Option<&str>,
        requested_by: Option<i64>,
    ) -> Result<InviteRequest, AppError> {
        let row: InviteRow = sqlx::query_as(&format!(
            "INSERT INTO invite_requests (name, email, requested_role, message, requested_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            INVITE_COLUMNS
        ))
        .bind(name)
        .bind(email)
        .bind(requested_role.as_str())
        .bind(message)
        .bind(requested_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_invite()
    }

    async fn find_invite_request(&self, id: i64) -> Result<Option<InviteRequest>, AppError> {
        let row: Option<InviteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invite_requests WHERE id = $1",
            INVITE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(InviteRow::into_invite).transpose()
    }

    async fn list_invite_requests(&self, limit: i64) -> Result<Vec<InviteRequest>, AppError> {
        let rows: Vec<InviteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invite_requests ORDER BY created_at DESC LIMIT $1",
            INVITE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(InviteRow::into_invite).collect()
    }

    async fn approve_invite_request(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
        processed_by: i64,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE invite_requests
             SET status = 'approved', token = $2, token_expires_at = $3,
                 processed_by = $4, processed_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .bind(processed_by)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn reject_invite_request(&self, id: i64, processed_by: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE invite_requests
             SET status = 'rejected', token = NULL, token_expires_at = NULL,
                 processed_by = $2, processed_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(processed_by)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn redeem_invite_token(
        &self,
        token: &str,
        account_id: i64,
    ) -> Result<Option<InviteRequest>, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Single-use is enforced by the atomic transition out of 'approved'.
        let row: Option<InviteRow> = sqlx::query_as(&format!(
            "UPDATE invite_requests
             SET status = 'redeemed', token = NULL
             WHERE token = $1 AND status = 'approved' AND token_expires_at > now()
             RETURNING {}",
            INVITE_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        };

        let request = row.into_invite()?;

        let affected = sqlx::query("UPDATE accounts SET role = $1 WHERE id = $2")
            .bind(request.requested_role.as_str())
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        if affected == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(AppError::NotFound(anyhow::anyhow!("Account not found")));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(Some(request))
    }

    async fn create_account_with_invite(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        token: &str,
        requested_role: Role,
    ) -> Result<Option<Account>, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<InviteRow> = sqlx::query_as(&format!(
            "UPDATE invite_requests
             SET status = 'redeemed', token = NULL
             WHERE token = $1 AND status = 'approved' AND token_expires_at > now()
               AND requested_role = $2
             RETURNING {}",
            INVITE_COLUMNS
        ))
        .bind(token)
        .bind(requested_role.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if row.is_none() {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        }

        let account: AccountRow = sqlx::query_as(&format!(
            "INSERT INTO accounts (name, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(requested_role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("An account with this email already exists"))
            }
            _ => db_err(e),
        })?;

        tx.commit().await.map_err(db_err)?;
        account.into_account().map(Some)
    }

    async fn create_incident(
        &self,
        description: &str,
        reported_by: Option<i64>,
    ) -> Result<Incident, AppError> {
        let row: IncidentRow = sqlx::query_as(
            "INSERT INTO incidents (description, reported_by)
             VALUES ($1, $2)
             RETURNING id, description, status, reported_by, created_at",
        )
        .bind(description)
        .bind(reported_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_incident()
    }

    async fn list_incidents(&self, limit: i64) -> Result<Vec<IncidentView>, AppError> {
        let rows: Vec<IncidentViewRow> = sqlx::query_as(
            "SELECT i.id, i.description, i.status, i.reported_by,
                    a.name AS reporter_name, i.created_at
             FROM incidents i
             LEFT JOIN accounts a ON a.id = i.reported_by
             ORDER BY i.created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(IncidentView {
                    id: row.id,
                    description: row.description,
                    status: parse_stored(&row.status, "incident status")?,
                    reported_by: row.reported_by,
                    reporter_name: row.reporter_name,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn update_incident_status(
        &self,
        id: i64,
        status: IncidentStatus,
    ) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE incidents SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn record_audit(&self, actor_id: Option<i64>, action: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO audit_log (actor_id, action) VALUES ($1, $2)")
            .bind(actor_id)
            .bind(action)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditView>, AppError> {
        let rows: Vec<AuditViewRow> = sqlx::query_as(
            "SELECT l.id, l.actor_id, a.name AS actor_name, l.action, l.created_at
             FROM audit_log l
             LEFT JOIN accounts a ON a.id = l.actor_id
             ORDER BY l.created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| AuditView {
                id: row.id,
                actor_id: row.actor_id,
                actor_name: row.actor_name,
                action: row.action,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
