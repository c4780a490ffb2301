//! Organization model - the tenant record owning users and displays.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Trial window granted to a newly registered organization.
pub const TRIAL_DAYS: i64 = 30;
/// Default screen quota for a newly registered organization.
pub const DEFAULT_SCREEN_QUOTA: i64 = 5;

#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subscription_tier: String,
    pub subscription_status: String,
    /// Quota fields are plain i64 at the store boundary; any wide-integer wire
    /// representation is coerced exactly once, before the value enters the
    /// domain or the profile cache.
    pub screen_quota: i64,
    pub trial_ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new trial organization with default quota.
    pub fn new_trial(name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            slug,
            subscription_tier: "free".to_string(),
            subscription_status: "trial".to_string(),
            screen_quota: DEFAULT_SCREEN_QUOTA,
            trial_ends_at: now + Duration::days(TRIAL_DAYS),
            created_at: now,
        }
    }

    pub fn summary(&self) -> OrganizationSummary {
        OrganizationSummary {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
            subscription_tier: self.subscription_tier.clone(),
            screen_quota: self.screen_quota,
            trial_ends_at: self.trial_ends_at,
        }
    }
}

/// Organization shape returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subscription_tier: String,
    pub screen_quota: i64,
    pub trial_ends_at: DateTime<Utc>,
}
