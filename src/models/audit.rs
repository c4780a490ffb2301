use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Audit trail entry written on register/login/logout events.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(organization_id: Uuid, user_id: Uuid, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            action: action.to_string(),
            entity_type: "user".to_string(),
            entity_id: user_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
