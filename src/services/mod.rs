pub mod auth;
pub mod database;
pub mod email;
pub mod jwt;
pub mod redis;
pub mod validator;

pub use auth::{AuthService, AuthSession, NewRegistration, ServiceError};
pub use database::{CredentialStore, MemoryCredentialStore, PostgresStore};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use jwt::{Claims, TokenCodec, TokenKind};
pub use redis::{EphemeralStore, MemoryStore, RedisStore};
pub use validator::{Rejection, TokenValidator, ValidateError};
