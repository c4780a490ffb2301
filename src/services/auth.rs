//! Account lifecycle: registration, login, refresh, and logout.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuditEntry, Organization, Principal, User};
use crate::services::database::CredentialStore;
use crate::services::email::EmailProvider;
use crate::services::jwt::TokenCodec;
use crate::services::redis::{revocation_key, EphemeralStore};
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};
use crate::utils::slug::slugify;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Email is already registered")]
    EmailAlreadyRegistered,
    #[error("Organization slug is already taken")]
    SlugTaken,
    #[error("Organization name does not yield a usable slug")]
    InvalidSlug,
    /// Covers unknown email, passwordless accounts, and wrong passwords alike.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Credential store unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::EmailAlreadyRegistered | ServiceError::SlugTaken => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::InvalidSlug => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::AccountInactive => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            ServiceError::Unavailable(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

pub struct NewRegistration {
    pub email: String,
    pub password: Password,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_name: String,
    pub organization_slug: Option<String>,
}

#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub organization: Organization,
    pub token: String,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn EphemeralStore>,
    codec: TokenCodec,
    email: Arc<dyn EmailProvider>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn EphemeralStore>,
        codec: TokenCodec,
        email: Arc<dyn EmailProvider>,
    ) -> Self {
        Self {
            credentials,
            store,
            codec,
            email,
        }
    }

    /// Register a new organization with its first admin user.
    pub async fn register(
        &self,
        registration: NewRegistration,
        client_ip: &str,
    ) -> Result<AuthSession, ServiceError> {
        let email = registration.email.trim().to_ascii_lowercase();

        if self
            .credentials
            .find_user_with_org_by_email(&email)
            .await
            .map_err(ServiceError::Unavailable)?
            .is_some()
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let slug = match registration.organization_slug {
            Some(slug) => slug,
            None => slugify(&registration.organization_name),
        };
        if slug.is_empty() {
            return Err(ServiceError::InvalidSlug);
        }

        if self
            .credentials
            .find_organization_by_slug(&slug)
            .await
            .map_err(ServiceError::Unavailable)?
            .is_some()
        {
            return Err(ServiceError::SlugTaken);
        }

        let password_hash = hash_password(&registration.password)?;

        let organization = Organization::new_trial(registration.organization_name, slug);
        let user = User::new_admin(
            organization.id,
            email,
            password_hash.into_string(),
            registration.first_name,
            registration.last_name,
        );
        let audit = AuditEntry::new(organization.id, user.id, "user.register");

        self.credentials
            .create_organization_with_admin(&organization, &user, &audit)
            .await
            .map_err(ServiceError::Unavailable)?;

        tracing::info!(
            user_id = %user.id,
            organization_id = %organization.id,
            client_ip = %client_ip,
            "Registered new organization admin"
        );

        let token = self.issue_for(&user)?;

        // Welcome mail is best effort and off the request path.
        let email_provider = self.email.clone();
        let to = user.email.clone();
        let first_name = user.first_name.clone();
        let org_name = organization.name.clone();
        tokio::spawn(async move {
            if let Err(e) = email_provider
                .send_welcome_email(&to, first_name.as_deref(), &org_name)
                .await
            {
                tracing::warn!(error = %e, "Welcome email failed");
            }
        });

        Ok(AuthSession {
            user,
            organization,
            token,
        })
    }

    /// Authenticate by email and password.
    ///
    /// Unknown email, missing hash, and wrong password all collapse into the
    /// same error so callers cannot probe which emails exist.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        client_ip: &str,
    ) -> Result<AuthSession, ServiceError> {
        let email = email.trim().to_ascii_lowercase();

        let (user, organization) = self
            .credentials
            .find_user_with_org_by_email(&email)
            .await
            .map_err(ServiceError::Unavailable)?
            .ok_or(ServiceError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .clone()
            .map(PasswordHashString::new)
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(password, &hash).map_err(|_| ServiceError::InvalidCredentials)?;

        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }

        let token = self.issue_for(&user)?;

        if let Err(e) = self.credentials.update_last_login(user.id).await {
            tracing::warn!(error = %e, user_id = %user.id, "Last-login update failed");
        }
        self.audit_best_effort(AuditEntry::new(organization.id, user.id, "user.login"));

        tracing::info!(user_id = %user.id, client_ip = %client_ip, "User logged in");

        Ok(AuthSession {
            user,
            organization,
            token,
        })
    }

    /// Issue a fresh full-lifetime token for an already-validated principal.
    /// The previous token stays live until it expires on its own.
    pub fn refresh(&self, principal: &Principal) -> Result<String, ServiceError> {
        let token = self.codec.issue(
            &principal.id.to_string(),
            &principal.email,
            &principal.organization_id.to_string(),
            &principal.role,
            principal.is_super_admin,
        )?;
        Ok(token)
    }

    /// Revoke the presented token. Never fails and is idempotent: expired or
    /// malformed tokens and repeat calls all land in the same logged-out state.
    pub async fn logout(&self, token: Option<&str>, client_ip: &str) {
        let Some(token) = token else {
            return;
        };
        let Some(claims) = self.codec.decode_lenient(token) else {
            tracing::debug!("Logout with undecodable token");
            return;
        };

        if let Some(jti) = claims.jti.as_deref() {
            let remaining = claims.exp - chrono::Utc::now().timestamp();
            let ttl = if remaining > 0 {
                remaining.min(self.codec.token_expiry_seconds())
            } else {
                self.codec.token_expiry_seconds()
            };

            if let Err(e) = self.store.put(&revocation_key(jti), "revoked", ttl).await {
                tracing::warn!(error = %e, "Failed to persist revocation marker");
            }
        } else {
            // Tokens without an id cannot be revoked; they age out instead.
            tracing::debug!(sub = %claims.sub, "Logout for token without jti");
        }

        if let (Ok(user_id), Ok(org_id)) = (
            Uuid::parse_str(&claims.sub),
            Uuid::parse_str(&claims.organization_id),
        ) {
            self.audit_best_effort(AuditEntry::new(org_id, user_id, "user.logout"));
        }

        tracing::info!(sub = %claims.sub, client_ip = %client_ip, "User logged out");
    }

    pub fn token_expiry_seconds(&self) -> i64 {
        self.codec.token_expiry_seconds()
    }

    fn issue_for(&self, user: &User) -> Result<String, ServiceError> {
        let token = self.codec.issue(
            &user.id.to_string(),
            &user.email,
            &user.organization_id.to_string(),
            &user.role,
            user.is_super_admin,
        )?;
        Ok(token)
    }

    fn audit_best_effort(&self, entry: AuditEntry) {
        let credentials = self.credentials.clone();
        tokio::spawn(async move {
            if let Err(e) = credentials.insert_audit(&entry).await {
                tracing::warn!(error = %e, action = %entry.action, "Audit insert failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::MemoryCredentialStore;
    use crate::services::email::MockEmailService;
    use crate::services::redis::MemoryStore;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn service() -> (AuthService, Arc<MemoryCredentialStore>, Arc<MemoryStore>) {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(
            credentials.clone(),
            store.clone(),
            TokenCodec::new(SECRET, 3600).unwrap(),
            Arc::new(MockEmailService),
        );
        (service, credentials, store)
    }

    fn registration(email: &str, org: &str) -> NewRegistration {
        NewRegistration {
            email: email.to_string(),
            password: Password::new("a strong passphrase".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: None,
            organization_name: org.to_string(),
            organization_slug: None,
        }
    }

    #[tokio::test]
    async fn register_creates_trial_org_with_admin() {
        let (service, credentials, _) = service();

        let session = service
            .register(registration("Admin@Acme.test", "Acme Corp"), "203.0.113.9")
            .await
            .unwrap();

        assert_eq!(session.user.email, "admin@acme.test");
        assert_eq!(session.user.role, "admin");
        assert_eq!(session.organization.slug, "acme-corp");
        assert_eq!(session.organization.subscription_status, "trial");
        assert!(!session.token.is_empty());
        assert!(credentials
            .audit_actions()
            .contains(&"user.register".to_string()));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let (service, _, _) = service();
        service
            .register(registration("admin@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();

        let err = service
            .register(registration("admin@acme.test", "Other Org"), "203.0.113.9")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn register_rejects_taken_slug() {
        let (service, _, _) = service();
        service
            .register(registration("one@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();

        let err = service
            .register(registration("two@acme.test", "acme"), "203.0.113.9")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SlugTaken));
    }

    #[tokio::test]
    async fn login_returns_session_for_valid_credentials() {
        let (service, _, _) = service();
        let registered = service
            .register(registration("admin@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();

        let password = Password::new("a strong passphrase".to_string());
        let session = service
            .login("admin@acme.test", &password, "203.0.113.9")
            .await
            .unwrap();
        assert_eq!(session.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn login_errors_are_indistinguishable() {
        let (service, _, _) = service();
        service
            .register(registration("admin@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();

        let wrong = Password::new("not the passphrase".to_string());
        let bad_password = service
            .login("admin@acme.test", &wrong, "203.0.113.9")
            .await
            .unwrap_err();
        let unknown_email = service
            .login("nobody@acme.test", &wrong, "203.0.113.9")
            .await
            .unwrap_err();

        assert_eq!(bad_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn login_refuses_inactive_accounts() {
        let (service, credentials, _) = service();
        let session = service
            .register(registration("admin@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();
        credentials.set_active(session.user.id, false);

        let password = Password::new("a strong passphrase".to_string());
        let err = service
            .login("admin@acme.test", &password, "203.0.113.9")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountInactive));
    }

    #[tokio::test]
    async fn logout_revokes_and_is_idempotent() {
        let (service, _, store) = service();
        let session = service
            .register(registration("admin@acme.test", "Acme"), "203.0.113.9")
            .await
            .unwrap();

        service.logout(Some(&session.token), "203.0.113.9").await;
        service.logout(Some(&session.token), "203.0.113.9").await;
        service.logout(Some("garbage"), "203.0.113.9").await;
        service.logout(None, "203.0.113.9").await;

        // Exactly one live revocation marker, bounded by the token lifetime.
        let claims = TokenCodec::new(SECRET, 3600)
            .unwrap()
            .decode_lenient(&session.token)
            .unwrap();
        let ttl = store.ttl_of(&revocation_key(claims.jti.as_deref().unwrap()));
        assert!(ttl.is_some_and(|t| t <= 3600));
    }
}
