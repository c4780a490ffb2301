pub mod auth;
pub mod csrf;

pub use auth::{require_auth, CurrentUser, RawCredential};
pub use csrf::{csrf_guard, csrf_issue};
