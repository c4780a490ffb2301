pub mod audit;
pub mod organization;
pub mod principal;
pub mod user;

pub use audit::AuditEntry;
pub use organization::{Organization, OrganizationSummary};
pub use principal::Principal;
pub use user::{SanitizedUser, User};
