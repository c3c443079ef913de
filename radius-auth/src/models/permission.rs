//! Permission and role names used by the admin application.
//!
//! Permissions are dotted `resource.action` strings.

pub const USERS_READ: &str = "users.read";
pub const USERS_CREATE: &str = "users.create";
pub const USERS_UPDATE: &str = "users.update";
pub const USERS_DELETE: &str = "users.delete";

pub const GROUPS_READ: &str = "groups.read";
pub const GROUPS_CREATE: &str = "groups.create";
pub const GROUPS_UPDATE: &str = "groups.update";
pub const GROUPS_DELETE: &str = "groups.delete";

pub const SESSIONS_READ: &str = "sessions.read";
pub const SESSIONS_MANAGE: &str = "sessions.manage";
pub const SESSIONS_DISCONNECT: &str = "sessions.disconnect";

pub const RADIUS_READ: &str = "radius.read";
pub const RADIUS_CREATE: &str = "radius.create";
pub const RADIUS_UPDATE: &str = "radius.update";
pub const RADIUS_DELETE: &str = "radius.delete";

pub const DASHBOARD_READ: &str = "dashboard.read";
pub const DASHBOARD_MANAGE: &str = "dashboard.manage";

pub const AUDIT_READ: &str = "audit.read";
pub const AUDIT_EXPORT: &str = "audit.export";
pub const AUDIT_MANAGE: &str = "audit.manage";

pub const SYSTEM_MANAGE: &str = "system.manage";
pub const SYSTEM_CONFIGURE: &str = "system.configure";

/// Role names of the baseline role table.
pub mod roles {
    pub const ADMIN: &str = "Admin";
    pub const MANAGER: &str = "Manager";
    pub const NOC: &str = "NOC";
    pub const HELPDESK: &str = "Helpdesk";
    pub const AUDITOR: &str = "Auditor";
    pub const USER: &str = "User";
}
