use serde_json::json;
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use super::audit::AuditTrail;
use crate::models::permission::{self as perm, roles};
use crate::models::{AuthRequirement, Principal, SecurityEventType};

/// Role name to granted permissions. Role lookup ignores case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermissionTable {
    roles: HashMap<String, BTreeSet<String>>,
}

impl RolePermissionTable {
    /// The built-in role table.
    pub fn baseline() -> Self {
        Self::from_map([
            (
                roles::ADMIN,
                vec![
                    perm::USERS_READ,
                    perm::USERS_CREATE,
                    perm::USERS_UPDATE,
                    perm::USERS_DELETE,
                    perm::GROUPS_READ,
                    perm::GROUPS_CREATE,
                    perm::GROUPS_UPDATE,
                    perm::GROUPS_DELETE,
                    perm::SESSIONS_READ,
                    perm::SESSIONS_MANAGE,
                    perm::SESSIONS_DISCONNECT,
                    perm::RADIUS_READ,
                    perm::RADIUS_CREATE,
                    perm::RADIUS_UPDATE,
                    perm::RADIUS_DELETE,
                    perm::DASHBOARD_READ,
                    perm::DASHBOARD_MANAGE,
                    perm::AUDIT_READ,
                    perm::AUDIT_EXPORT,
                    perm::AUDIT_MANAGE,
                    perm::SYSTEM_MANAGE,
                    perm::SYSTEM_CONFIGURE,
                ],
            ),
            (
                roles::MANAGER,
                vec![
                    perm::USERS_READ,
                    perm::USERS_CREATE,
                    perm::USERS_UPDATE,
                    perm::GROUPS_READ,
                    perm::GROUPS_CREATE,
                    perm::GROUPS_UPDATE,
                    perm::SESSIONS_READ,
                    perm::SESSIONS_MANAGE,
                    perm::SESSIONS_DISCONNECT,
                    perm::RADIUS_READ,
                    perm::RADIUS_CREATE,
                    perm::RADIUS_UPDATE,
                    perm::DASHBOARD_READ,
                    perm::AUDIT_READ,
                    perm::AUDIT_EXPORT,
                ],
            ),
            (
                roles::NOC,
                vec![
                    perm::USERS_READ,
                    perm::USERS_UPDATE,
                    perm::GROUPS_READ,
                    perm::SESSIONS_READ,
                    perm::SESSIONS_MANAGE,
                    perm::SESSIONS_DISCONNECT,
                    perm::RADIUS_READ,
                    perm::DASHBOARD_READ,
                    perm::AUDIT_READ,
                ],
            ),
            (
                roles::HELPDESK,
                vec![
                    perm::USERS_READ,
                    perm::USERS_UPDATE,
                    perm::GROUPS_READ,
                    perm::SESSIONS_READ,
                    perm::RADIUS_READ,
                    perm::DASHBOARD_READ,
                ],
            ),
            (
                roles::AUDITOR,
                vec![
                    perm::USERS_READ,
                    perm::GROUPS_READ,
                    perm::SESSIONS_READ,
                    perm::RADIUS_READ,
                    perm::DASHBOARD_READ,
                    perm::AUDIT_READ,
                    perm::AUDIT_EXPORT,
                ],
            ),
            (roles::USER, vec![perm::DASHBOARD_READ]),
        ])
    }

    pub fn from_map<I, R, P, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, P)>,
        R: AsRef<str>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut roles: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (role, permissions) in entries {
            roles
                .entry(role.as_ref().trim().to_lowercase())
                .or_default()
                .extend(permissions.into_iter().map(Into::into));
        }
        Self { roles }
    }

    /// Load a role table from a `toml`, `json` or `yaml` file mapping role
    /// names to permission lists. Replaces the baseline entirely.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let entries: HashMap<String, Vec<String>> = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                anyhow::anyhow!("Failed to load role permissions from {}: {}", path.display(), e)
            })?;

        let table = Self::from_map(entries);
        tracing::info!(
            path = %path.display(),
            roles = table.roles.len(),
            "Loaded role permission table"
        );
        Ok(table)
    }

    /// Permissions granted to `role`; unknown roles grant nothing.
    pub fn permissions_for(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(&role.trim().to_lowercase())
    }

    pub fn role_grants(&self, role: &str, permission: &str) -> bool {
        self.permissions_for(role)
            .map(|granted| granted.contains(permission))
            .unwrap_or(false)
    }

    /// Explicit claims plus everything the principal's roles grant.
    pub fn effective_permissions(&self, principal: &Principal) -> BTreeSet<String> {
        let mut permissions = principal.permissions().clone();
        for role in principal.roles() {
            if let Some(granted) = self.permissions_for(role) {
                permissions.extend(granted.iter().cloned());
            }
        }
        permissions
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Why access was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantBasis {
    /// The principal carries the permission as a claim.
    ExplicitClaim,
    /// One of the principal's roles maps to the permission.
    RoleMapping { role: String },
    /// The principal holds one of the allowed roles.
    RoleMembership { role: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Unauthenticated,
    NoRoles,
    MissingPermission,
    RoleNotAllowed,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Unauthenticated => "unauthenticated",
            DenialReason::NoRoles => "no_roles",
            DenialReason::MissingPermission => "missing_permission",
            DenialReason::RoleNotAllowed => "role_not_allowed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(GrantBasis),
    Deny(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Deny-by-default authorization over a shared, immutable role table.
#[derive(Clone)]
pub struct PermissionEvaluator {
    table: Arc<RolePermissionTable>,
    audit: AuditTrail,
}

impl PermissionEvaluator {
    pub fn new(table: Arc<RolePermissionTable>, audit: AuditTrail) -> Self {
        Self { table, audit }
    }

    pub fn table(&self) -> &RolePermissionTable {
        &self.table
    }

    /// Decide without side effects.
    pub fn evaluate(
        &self,
        principal: Option<&Principal>,
        requirement: &AuthRequirement,
    ) -> Decision {
        let Some(principal) = principal else {
            return Decision::Deny(DenialReason::Unauthenticated);
        };

        match requirement {
            AuthRequirement::Permission(required) => {
                let permission = required.permission();
                if principal.has_permission_claim(permission) {
                    return Decision::Allow(GrantBasis::ExplicitClaim);
                }
                principal
                    .roles()
                    .iter()
                    .find(|role| self.table.role_grants(role, permission))
                    .map(|role| Decision::Allow(GrantBasis::RoleMapping { role: role.clone() }))
                    .unwrap_or(Decision::Deny(DenialReason::MissingPermission))
            }
            AuthRequirement::AnyRole(allowed) => {
                if principal.roles().is_empty() {
                    return Decision::Deny(DenialReason::NoRoles);
                }
                principal
                    .roles()
                    .iter()
                    .find(|role| allowed.roles().iter().any(|a| a.eq_ignore_ascii_case(role)))
                    .map(|role| Decision::Allow(GrantBasis::RoleMembership { role: role.clone() }))
                    .unwrap_or(Decision::Deny(DenialReason::RoleNotAllowed))
            }
        }
    }

    /// Decide and record the decision.
    ///
    /// Denials and grants through the role table are audited; explicit-claim
    /// grants and role-membership grants are not. The error returned on denial
    /// never says why.
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        requirement: &AuthRequirement,
    ) -> Result<GrantBasis, AppError> {
        let decision = self.evaluate(principal, requirement);
        let user_id = principal.map(|p| p.user_id());

        match decision {
            Decision::Allow(GrantBasis::RoleMapping { role }) => {
                tracing::debug!(
                    requirement = %requirement.describe(),
                    role = %role,
                    "Access granted through role mapping"
                );
                self.audit
                    .security_event(
                        SecurityEventType::AccessGrantedByRole,
                        "Access granted through role mapping",
                        Some(json!({
                            "requirement": requirement.describe(),
                            "role": role.clone(),
                            "userId": user_id,
                        })),
                    )
                    .await;
                Ok(GrantBasis::RoleMapping { role })
            }
            Decision::Allow(basis) => Ok(basis),
            Decision::Deny(reason) => {
                tracing::warn!(
                    requirement = %requirement.describe(),
                    reason = reason.as_str(),
                    user_id = ?user_id,
                    "Access denied"
                );
                self.audit
                    .security_event(
                        SecurityEventType::AccessDenied,
                        "Access denied",
                        Some(json!({
                            "requirement": requirement.describe(),
                            "reason": reason.as_str(),
                            "userId": user_id,
                        })),
                    )
                    .await;

                Err(match reason {
                    DenialReason::Unauthenticated => {
                        AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
                    }
                    _ => AppError::Forbidden(anyhow::anyhow!("Access denied")),
                })
            }
        }
    }
}
