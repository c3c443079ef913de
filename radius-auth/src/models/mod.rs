//! Domain models for the authentication/authorization core.

pub mod audit_event;
pub mod permission;
pub mod principal;
pub mod requirement;
pub mod token_record;

pub use audit_event::{
    AuditEvent, AuditEventKind, ContextSnapshot, OperationFrame, RequestContext, ScopeProperties,
    SecurityEventType, Severity,
};
pub use principal::Principal;
pub use requirement::{AuthRequirement, PermissionRequirement, RoleRequirement};
pub use token_record::{ttl_seconds, TokenRecord};
