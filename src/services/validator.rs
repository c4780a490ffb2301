//! Token validation pipeline for protected routes.
//!
//! Ordering is load-bearing: domain gating happens before any store access,
//! the revocation check strictly precedes the profile cache read, and the
//! cache is written before the active-flag check so inactive users are cached
//! the same way active ones are.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::Principal;
use crate::services::database::CredentialStore;
use crate::services::jwt::{TokenCodec, TokenKind};
use crate::services::redis::{profile_cache_key, revocation_key, EphemeralStore};

/// Why a credential was refused. Logged per-variant; callers collapse all of
/// these into one undifferentiated 401 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Missing,
    InvalidOrExpired,
    WrongDomain,
    Revoked,
    InactiveOrNotFound,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Missing => "missing_credential",
            Rejection::InvalidOrExpired => "invalid_or_expired",
            Rejection::WrongDomain => "wrong_domain",
            Rejection::Revoked => "revoked",
            Rejection::InactiveOrNotFound => "inactive_or_not_found",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// The credential was refused. Never caused by infrastructure.
    #[error("credential rejected: {}", .0.reason())]
    Rejected(Rejection),
    /// A backing store could not answer; the request must fail, not pass.
    #[error("validation unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

pub struct TokenValidator {
    codec: TokenCodec,
    store: Arc<dyn EphemeralStore>,
    credentials: Arc<dyn CredentialStore>,
    cache_ttl_seconds: i64,
}

impl TokenValidator {
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn EphemeralStore>,
        credentials: Arc<dyn CredentialStore>,
        cache_ttl_seconds: i64,
    ) -> Self {
        Self {
            codec,
            store,
            credentials,
            cache_ttl_seconds,
        }
    }

    /// Run the full pipeline against an extracted credential.
    pub async fn validate(&self, token: Option<&str>) -> Result<Principal, ValidateError> {
        let token = token.ok_or(ValidateError::Rejected(Rejection::Missing))?;

        let claims = self
            .codec
            .verify(token)
            .map_err(|_| ValidateError::Rejected(Rejection::InvalidOrExpired))?;

        // Foreign-domain and unrecognized tokens are turned away before any
        // store is consulted.
        match claims.kind {
            TokenKind::User => {}
            TokenKind::Device | TokenKind::Unknown => {
                return Err(ValidateError::Rejected(Rejection::WrongDomain));
            }
        }

        if let Some(jti) = claims.jti.as_deref() {
            let revoked = self
                .store
                .exists(&revocation_key(jti))
                .await
                .map_err(ValidateError::Unavailable)?;
            if revoked {
                return Err(ValidateError::Rejected(Rejection::Revoked));
            }
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ValidateError::Rejected(Rejection::InactiveOrNotFound))?;

        let principal = match self.read_cached_profile(&claims.sub).await {
            Some(principal) => principal,
            None => self.load_and_cache_profile(user_id, &claims.sub).await?,
        };

        if !principal.active {
            return Err(ValidateError::Rejected(Rejection::InactiveOrNotFound));
        }
        Ok(principal)
    }

    /// A cache that cannot be read or parsed degrades to a miss.
    async fn read_cached_profile(&self, subject: &str) -> Option<Principal> {
        let key = profile_cache_key(subject);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Profile cache read failed, falling through");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable cached profile");
                None
            }
        }
    }

    async fn load_and_cache_profile(
        &self,
        user_id: Uuid,
        subject: &str,
    ) -> Result<Principal, ValidateError> {
        let (user, org) = self
            .credentials
            .find_user_with_org(user_id)
            .await
            .map_err(ValidateError::Unavailable)?
            .ok_or(ValidateError::Rejected(Rejection::InactiveOrNotFound))?;

        let principal = Principal::from_record(&user, &org);

        // Best effort: a failed write must not fail the request.
        match serde_json::to_string(&principal) {
            Ok(json) => {
                if let Err(e) = self
                    .store
                    .put(&profile_cache_key(subject), &json, self.cache_ttl_seconds)
                    .await
                {
                    tracing::warn!(error = %e, "Profile cache write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Profile serialization failed"),
        }

        Ok(principal)
    }
}
