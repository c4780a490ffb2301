//! User model - organization-scoped accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity as stored in the credential store.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Absent for accounts provisioned without a password. Login against such an
    /// account fails with the same generic error as a wrong password.
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub organization_id: Uuid,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create the admin user registered alongside a new organization.
    pub fn new_admin(
        organization_id: Uuid,
        email: String,
        password_hash: String,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            first_name,
            last_name,
            role: "admin".to_string(),
            is_super_admin: false,
            is_active: true,
            organization_id,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    /// Strip sensitive fields for API responses.
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role.clone(),
            is_active: self.is_active,
            organization_id: self.organization_id,
            created_at: self.created_at,
        }
    }
}

/// User shape returned to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}
