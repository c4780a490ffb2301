//! Token codec: stateless signing and verification of the claim set.
//!
//! Signature and expiry only. No authorization logic lives here; the validator
//! owns the revocation/cache/lookup state machine.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MIN_SECRET_LENGTH;

/// Trust domain a claim set belongs to. Absent on the wire means `user`.
/// A present value that is neither `user` nor `device` maps to `Unknown`,
/// which the validator rejects rather than defaulting to the user domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    User,
    Device,
    #[serde(other)]
    Unknown,
}

/// Signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(rename = "isSuperAdmin", default)]
    pub is_super_admin: bool,
    #[serde(rename = "type", default)]
    pub kind: TokenKind,
    /// Unique token id, the handle for revocation. A claim set without one is
    /// unrevokable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

/// HS256 codec for one trust domain. The user and device domains each get
/// their own codec over an independently keyed secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_seconds: i64,
}

impl TokenCodec {
    /// Build a codec over a shared secret. Fails if the secret is missing or
    /// shorter than [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: &str, token_expiry_seconds: i64) -> Result<Self, anyhow::Error> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(anyhow::anyhow!(
                "Signing secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry_seconds,
        })
    }

    /// Issue a user-domain token with a fresh `jti` and full lifetime.
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        organization_id: &str,
        role: &str,
        is_super_admin: bool,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            organization_id: organization_id.to_string(),
            role: role.to_string(),
            is_super_admin,
            kind: TokenKind::User,
            jti: Some(Uuid::new_v4().to_string()),
            exp: (now + Duration::seconds(self.token_expiry_seconds)).timestamp(),
            iat: now.timestamp(),
        };
        self.sign(&claims)
    }

    /// Sign an arbitrary claim set. The timestamps and `jti` are the caller's
    /// responsibility; `issue` is the usual entry point.
    pub fn sign(&self, claims: &Claims) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    /// Verify signature and expiry, returning the claim set.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Decode a token checking the signature but ignoring expiry. Used by
    /// logout, which must also be able to revoke an expired token's `jti`.
    pub fn decode_lenient(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()
            .map(|data| data.claims)
    }

    pub fn token_expiry_seconds(&self) -> i64 {
        self.token_expiry_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const OTHER_SECRET: &str = "fedcba9876543210fedcba9876543210";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 604_800).expect("Failed to build codec")
    }

    #[test]
    fn rejects_short_secret() {
        assert!(TokenCodec::new("short", 604_800).is_err());
        assert!(TokenCodec::new("", 604_800).is_err());
        assert!(TokenCodec::new(&"a".repeat(31), 604_800).is_err());
        assert!(TokenCodec::new(&"a".repeat(32), 604_800).is_ok());
    }

    #[test]
    fn issue_verify_round_trip() {
        let codec = codec();
        let token = codec
            .issue("user-1", "a@b.com", "org-1", "admin", false)
            .unwrap();

        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.organization_id, "org-1");
        assert_eq!(claims.role, "admin");
        assert!(!claims.is_super_admin);
        assert_eq!(claims.kind, TokenKind::User);
        assert!(claims.jti.is_some());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_expired_token() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "user-1".to_string(),
            email: "a@b.com".to_string(),
            organization_id: "org-1".to_string(),
            role: "admin".to_string(),
            is_super_admin: false,
            kind: TokenKind::User,
            jti: None,
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = codec.sign(&claims).unwrap();

        assert!(codec.verify(&token).is_err());
        // Lenient decode still recovers the claims for revocation purposes.
        let decoded = codec.decode_lenient(&token).unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn rejects_cross_domain_signature() {
        let user_codec = codec();
        let device_codec = TokenCodec::new(OTHER_SECRET, 604_800).unwrap();

        let token = device_codec
            .issue("device-1", "", "org-1", "", false)
            .unwrap();

        assert!(user_codec.verify(&token).is_err());
        assert!(user_codec.decode_lenient(&token).is_none());
    }

    #[test]
    fn absent_kind_defaults_to_user() {
        let json = serde_json::json!({
            "sub": "user-1",
            "organizationId": "org-1",
            "exp": 0,
            "iat": 0,
        });
        let claims: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(claims.kind, TokenKind::User);
        assert_eq!(claims.jti, None);
    }

    #[test]
    fn unrecognized_kind_maps_to_unknown() {
        // A capitalization mismatch must not fall back to the user domain.
        for value in ["Device", "DEVICE", "admin", "service"] {
            let json = serde_json::json!({
                "sub": "user-1",
                "organizationId": "org-1",
                "type": value,
                "exp": 0,
                "iat": 0,
            });
            let claims: Claims = serde_json::from_value(json).unwrap();
            assert_eq!(claims.kind, TokenKind::Unknown, "value {:?}", value);
        }
    }
}
