//! Services layer for radius-auth.
//!
//! TOTP, token lifecycle, revocation, authorization decisions and the audit
//! trail.

pub mod audit;
pub mod authenticator;
pub mod blacklist;
pub mod error;
mod jwt;
pub mod permission;
pub mod totp;

pub use audit::{AuditSink, AuditTrail, MemoryAuditSink, RedisAuditSink, TracingAuditSink};
pub use authenticator::{extract_token, ExtractedToken, TokenAuthenticator, TokenSource};
pub use blacklist::{InMemoryBlacklist, MockBlacklist, RedisBlacklist, TokenBlacklist};
pub use error::{BlacklistError, RequirementError, ServiceError, TokenError, TotpError};
pub use jwt::{AccessTokenClaims, JwtService, TokenSubject};
pub use permission::{
    Decision, DenialReason, GrantBasis, PermissionEvaluator, RolePermissionTable,
};
pub use totp::{TotpEngine, TotpEnrollment, TotpSecret};
