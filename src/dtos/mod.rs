pub mod auth;

pub use auth::{AuthResponse, LoginRequest, MessageResponse, RefreshResponse, RegisterRequest};
