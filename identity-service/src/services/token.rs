use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::models::Role;

/// JWT service for token issuance and verification.
///
/// Tokens are self-contained and never persisted; revocation happens either
/// through expiry or because the guard re-reads the authoritative role from
/// storage on every request.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
    reset_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenPurpose {
    #[default]
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "pwd_reset")]
    PasswordReset,
}

fn is_access(purpose: &TokenPurpose) -> bool {
    *purpose == TokenPurpose::Access
}

/// Token claims. The subject id is emitted under `id`; the legacy `user_id`
/// spelling is accepted on input and normalized here, never propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "user_id")]
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Absent on the wire means `access`.
    #[serde(default, skip_serializing_if = "is_access")]
    pub purpose: TokenPurpose,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_hours: config.access_token_expiry_hours,
            reset_token_expiry_minutes: config.reset_token_expiry_minutes,
        }
    }

    /// Issue an access token carrying the identity snapshot at issuance time.
    pub fn issue_access(
        &self,
        id: i64,
        email: &str,
        role: Role,
        name: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            id,
            email: Some(email.to_string()),
            role: Some(role),
            name: Some(name.to_string()),
            purpose: TokenPurpose::Access,
            exp: (now + Duration::hours(self.access_token_expiry_hours)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Issue a short-lived password-reset token carrying only the subject id.
    pub fn issue_reset(&self, id: i64) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            id,
            email: None,
            role: None,
            name: None,
            purpose: TokenPurpose::PasswordReset,
            exp: (now + Duration::minutes(self.reset_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode reset token: {}", e))
    }

    /// Verify signature and expiry. Pure token-layer validation; does not
    /// consult storage.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret".to_string(),
            access_token_expiry_hours: 24,
            reset_token_expiry_minutes: 15,
        })
    }

    #[test]
    fn access_token_round_trips() {
        let jwt = test_service();
        let token = jwt
            .issue_access(42, "alice@example.com", Role::Instructor, "Alice")
            .unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.role, Some(Role::Instructor));
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert_eq!(claims.purpose, TokenPurpose::Access);
    }

    #[test]
    fn expired_token_fails_with_expired() {
        let jwt = JwtService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret".to_string(),
            access_token_expiry_hours: -1,
            reset_token_expiry_minutes: 15,
        });
        let token = jwt
            .issue_access(1, "bob@example.com", Role::Student, "Bob")
            .unwrap();

        assert_eq!(jwt.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn tampered_token_fails_with_invalid() {
        let jwt = test_service();
        let token = jwt
            .issue_access(1, "bob@example.com", Role::Student, "Bob")
            .unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert_eq!(jwt.verify(&tampered).unwrap_err(), TokenError::Invalid);

        let other = JwtService::new(&JwtConfig {
            secret: "another-secret-another-secret-xxxxx".to_string(),
            access_token_expiry_hours: 24,
            reset_token_expiry_minutes: 15,
        });
        assert_eq!(other.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn legacy_user_id_claim_is_accepted() {
        let jwt = test_service();
        let now = Utc::now().timestamp();
        let legacy = serde_json::json!({
            "user_id": 7,
            "email": "carol@example.com",
            "role": "student",
            "name": "Carol",
            "exp": now + 3600,
            "iat": now,
        });
        let token = encode(
            &Header::default(),
            &legacy,
            &EncodingKey::from_secret("test-secret-test-secret-test-secret".as_bytes()),
        )
        .unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.purpose, TokenPurpose::Access);
    }

    #[test]
    fn reset_token_carries_only_subject_and_purpose() {
        let jwt = test_service();
        let token = jwt.issue_reset(9).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.id, 9);
        assert_eq!(claims.purpose, TokenPurpose::PasswordReset);
        assert!(claims.email.is_none());
        assert!(claims.role.is_none());
        assert!(claims.name.is_none());
    }
}
