use std::sync::Arc;

use gateway_auth::{
    build_router,
    config::{
        DatabaseConfig, Environment, GatewayConfig, JwtConfig, RedisConfig, SecurityConfig,
        SmtpConfig,
    },
    services::{
        AuthService, MemoryCredentialStore, MemoryStore, MockEmailService, TokenCodec,
        TokenValidator,
    },
    AppState,
};

pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret!";

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        environment: Environment::Dev,
        service_name: "gateway-auth".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        port: 3000,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            user_secret: TEST_SECRET.to_string(),
            device_secret: "device-secret-device-secret-device!!".to_string(),
            token_expiry_seconds: 604800,
            profile_cache_ttl_seconds: 30,
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "mailer@example.com".to_string(),
            password: "unused".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3001".to_string()],
            csrf_exempt_suffixes: vec![
                "/auth/login".to_string(),
                "/auth/register".to_string(),
                "/displays/pair".to_string(),
            ],
        },
    }
}

/// A fully wired app over in-memory stores. The store handles stay exposed so
/// tests can count operations.
pub struct TestApp {
    pub router: axum::Router,
    pub store: Arc<MemoryStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub codec: TokenCodec,
}

pub fn spawn_app() -> TestApp {
    let config = Arc::new(test_config());
    let store = Arc::new(MemoryStore::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    let email = Arc::new(MockEmailService);

    let codec = TokenCodec::new(TEST_SECRET, config.jwt.token_expiry_seconds)
        .expect("test codec");

    let validator = Arc::new(TokenValidator::new(
        codec.clone(),
        store.clone(),
        credentials.clone(),
        config.jwt.profile_cache_ttl_seconds,
    ));
    let auth = Arc::new(AuthService::new(
        credentials.clone(),
        store.clone(),
        codec.clone(),
        email.clone(),
    ));

    let state = AppState {
        config,
        credentials: credentials.clone(),
        store: store.clone(),
        email,
        auth,
        validator,
    };

    TestApp {
        router: build_router(state),
        store,
        credentials,
        codec,
    }
}
