pub mod audit_event;
pub mod identity;
pub mod refresh_session;
pub mod tenant;

pub use audit_event::{AuditAction, AuditEvent};
pub use identity::{Identity, IdentityResponse, IdentityWithProjects, NewIdentity};
pub use refresh_session::RefreshSession;
pub use tenant::{MemberProject, NewTenant, Tenant};
