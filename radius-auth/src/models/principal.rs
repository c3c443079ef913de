//! Authenticated identity attached to a request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// The identity resolved from a validated access token.
///
/// Built once by the authenticator and never mutated afterwards; the
/// consuming `with_*` methods exist only for construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    user_id: String,
    username: String,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    token_id: String,
    expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        token_id: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            token_id: token_id.into(),
            expires_at,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Explicit `permission` claims carried by the token.
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// JWT id of the token this principal was derived from.
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn has_permission_claim(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Case-insensitive role membership.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_membership_ignores_case() {
        let principal =
            Principal::new("u-1", "alice", "jti-1", Utc::now()).with_roles(["NOC"]);
        assert!(principal.has_role("noc"));
        assert!(principal.has_role("NOC"));
        assert!(!principal.has_role("Admin"));
    }

    #[test]
    fn test_permission_claims_are_exact() {
        let principal = Principal::new("u-1", "alice", "jti-1", Utc::now())
            .with_permissions(["users.delete"]);
        assert!(principal.has_permission_claim("users.delete"));
        assert!(!principal.has_permission_claim("Users.Delete"));
    }
}
