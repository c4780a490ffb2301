//! Credential store: the system of record for users and organizations.
//!
//! Accessed read-mostly by the validator; the auth service additionally
//! creates the organization/user pair at registration and appends audit
//! entries. Behind a trait object so tests run against the in-memory fake.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{AuditEntry, Organization, User};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user joined with its organization by id.
    async fn find_user_with_org(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(User, Organization)>, anyhow::Error>;

    /// Look up a user joined with its organization by email.
    async fn find_user_with_org_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(User, Organization)>, anyhow::Error>;

    async fn find_organization_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Organization>, anyhow::Error>;

    /// Create the organization, its admin user, and the registration audit
    /// entry as one atomic unit.
    async fn create_organization_with_admin(
        &self,
        org: &Organization,
        user: &User,
        audit: &AuditEntry,
    ) -> Result<(), anyhow::Error>;

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error>;

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// PostgreSQL-backed credential store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &crate::config::DatabaseConfig) -> Result<Self, anyhow::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Postgres: {}", e))?;

        tracing::info!("Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_org(&self, org_id: Uuid) -> Result<Option<Organization>, anyhow::Error> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn join_org(
        &self,
        user: Option<User>,
    ) -> Result<Option<(User, Organization)>, anyhow::Error> {
        let Some(user) = user else {
            return Ok(None);
        };
        match self.find_org(user.organization_id).await? {
            Some(org) => Ok(Some((user, org))),
            None => {
                // A user without its organization is a data-integrity problem;
                // treat it as not found rather than failing the request.
                tracing::warn!(user_id = %user.id, "User references a missing organization");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn find_user_with_org(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(User, Organization)>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        self.join_org(user).await
    }

    async fn find_user_with_org_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(User, Organization)>, anyhow::Error> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        self.join_org(user).await
    }

    async fn find_organization_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Organization>, anyhow::Error> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn create_organization_with_admin(
        &self,
        org: &Organization,
        user: &User,
        audit: &AuditEntry,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations
                (id, name, slug, subscription_tier, subscription_status,
                 screen_quota, trial_ends_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.slug)
        .bind(&org.subscription_tier)
        .bind(&org.subscription_status)
        .bind(org.screen_quota)
        .bind(org.trial_ends_at)
        .bind(org.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, password_hash, first_name, last_name, role,
                 is_super_admin, is_active, organization_id, last_login_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(user.is_super_admin)
        .bind(user.is_active)
        .bind(user.organization_id)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, organization_id, user_id, action, entity_type, entity_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(audit.id)
        .bind(audit.organization_id)
        .bind(audit.user_id)
        .bind(&audit.action)
        .bind(&audit.entity_type)
        .bind(&audit.entity_id)
        .bind(audit.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, organization_id, user_id, action, entity_type, entity_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.organization_id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    audits: Vec<AuditEntry>,
}

/// In-memory credential store with a lookup counter, used by tests to assert
/// exactly when the validator falls back past the cache.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<MemoryInner>,
    pub user_lookups: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, anyhow::Error> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory credential store mutex poisoned: {}", e))
    }

    pub fn lookup_count(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.audits.iter().map(|a| a.action.clone()).collect())
            .unwrap_or_default()
    }

    /// Test helper: flip a user's active flag.
    pub fn set_active(&self, user_id: Uuid, active: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(user) = inner.users.get_mut(&user_id) {
                user.is_active = active;
            }
        }
    }

    /// Test helper: seed a user/organization pair directly.
    pub fn seed(&self, user: User, org: Organization) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.organizations.insert(org.id, org);
            inner.users.insert(user.id, user);
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_with_org(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(User, Organization)>, anyhow::Error> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;
        Ok(inner.users.get(&user_id).and_then(|user| {
            inner
                .organizations
                .get(&user.organization_id)
                .map(|org| (user.clone(), org.clone()))
        }))
    }

    async fn find_user_with_org_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(User, Organization)>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .and_then(|user| {
                inner
                    .organizations
                    .get(&user.organization_id)
                    .map(|org| (user.clone(), org.clone()))
            }))
    }

    async fn find_organization_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Organization>, anyhow::Error> {
        let inner = self.lock()?;
        Ok(inner
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn create_organization_with_admin(
        &self,
        org: &Organization,
        user: &User,
        audit: &AuditEntry,
    ) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        inner.organizations.insert(org.id, org.clone());
        inner.users.insert(user.id, user.clone());
        inner.audits.push(audit.clone());
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.last_login_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        self.lock()?.audits.push(entry.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
