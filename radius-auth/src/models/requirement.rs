//! Authorization requirements attached to routes.

use crate::services::error::RequirementError;

/// A single permission the caller must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement(String);

impl PermissionRequirement {
    pub fn new(permission: impl Into<String>) -> Result<Self, RequirementError> {
        let permission = permission.into();
        let trimmed = permission.trim();
        if trimmed.is_empty() {
            return Err(RequirementError::EmptyPermission);
        }
        match trimmed.split_once('.') {
            Some((resource, action))
                if !resource.is_empty()
                    && !action.is_empty()
                    && !trimmed.chars().any(char::is_whitespace) =>
            {
                Ok(Self(trimmed.to_string()))
            }
            _ => Err(RequirementError::MalformedPermission(permission)),
        }
    }

    pub fn permission(&self) -> &str {
        &self.0
    }
}

/// A non-empty, ordered list of acceptable roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequirement(Vec<String>);

impl RoleRequirement {
    pub fn new<I, S>(roles: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles
            .into_iter()
            .map(Into::into)
            .filter(|r| !r.trim().is_empty())
            .collect();
        if roles.is_empty() {
            return Err(RequirementError::EmptyRoleSet);
        }
        Ok(Self(roles))
    }

    pub fn roles(&self) -> &[String] {
        &self.0
    }
}

/// The two kinds of authorization requirement a route can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequirement {
    Permission(PermissionRequirement),
    AnyRole(RoleRequirement),
}

impl AuthRequirement {
    pub fn permission(permission: impl Into<String>) -> Result<Self, RequirementError> {
        PermissionRequirement::new(permission).map(AuthRequirement::Permission)
    }

    pub fn any_role<I, S>(roles: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RoleRequirement::new(roles).map(AuthRequirement::AnyRole)
    }

    /// Human-readable form for logs and audit details.
    pub fn describe(&self) -> String {
        match self {
            AuthRequirement::Permission(p) => format!("permission:{}", p.permission()),
            AuthRequirement::AnyRole(r) => format!("any_role:{}", r.roles().join(",")),
        }
    }
}
