//! The resolved, authenticated identity handed to downstream handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Organization, User};

/// Denormalized snapshot of a user and its organization.
///
/// This is both the value returned to request handlers and the exact shape
/// written into the profile cache, so a cache hit reconstructs it without any
/// credential-store access. The `active` flag is carried rather than filtered:
/// inactive users are cached identically to active ones and the flag is checked
/// after every cache read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_super_admin: bool,
    pub active: bool,
    pub organization_id: Uuid,
    pub organization_name: String,
    pub subscription_tier: String,
    pub screen_quota: i64,
}

impl Principal {
    pub fn from_record(user: &User, org: &Organization) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.clone(),
            is_super_admin: user.is_super_admin,
            active: user.is_active,
            organization_id: org.id,
            organization_name: org.name.clone(),
            subscription_tier: org.subscription_tier.clone(),
            screen_quota: org.screen_quota,
        }
    }
}
