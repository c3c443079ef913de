//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    UserAction,
    SecurityEvent,
    PerformanceMetric,
    ApiRequest,
    Error,
    BusinessEvent,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::UserAction => "user_action",
            AuditEventKind::SecurityEvent => "security_event",
            AuditEventKind::PerformanceMetric => "performance_metric",
            AuditEventKind::ApiRequest => "api_request",
            AuditEventKind::Error => "error",
            AuditEventKind::BusinessEvent => "business_event",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl Severity {
    /// Server errors are errors, client errors are warnings.
    pub fn for_status(status: u16) -> Self {
        if status >= 500 {
            Severity::Error
        } else if status >= 400 {
            Severity::Warning
        } else {
            Severity::Information
        }
    }

    /// Slow operations warn regardless of outcome.
    pub fn for_duration(duration_ms: u64, slow_threshold_ms: u64) -> Self {
        if duration_ms > slow_threshold_ms {
            Severity::Warning
        } else {
            Severity::Information
        }
    }
}

/// Security audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// Token failed signature, expiry or claim validation
    InvalidTokenUsage,
    /// Token found on the blacklist was presented
    RevokedTokenUsage,
    /// The revocation store could not be consulted
    RevocationCheckFailed,
    /// A token was put on the blacklist
    TokenRevoked,
    /// Authorization requirement not met
    AccessDenied,
    /// Authorization granted through the role table rather than an explicit claim
    AccessGrantedByRole,
    /// TOTP code rejected
    TotpVerificationFailed,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::InvalidTokenUsage => "invalid_token_usage",
            SecurityEventType::RevokedTokenUsage => "revoked_token_usage",
            SecurityEventType::RevocationCheckFailed => "revocation_check_failed",
            SecurityEventType::TokenRevoked => "token_revoked",
            SecurityEventType::AccessDenied => "access_denied",
            SecurityEventType::AccessGrantedByRole => "access_granted_by_role",
            SecurityEventType::TotpVerificationFailed => "totp_verification_failed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SecurityEventType::TokenRevoked | SecurityEventType::AccessGrantedByRole => {
                Severity::Information
            }
            SecurityEventType::RevocationCheckFailed => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

/// Request metadata captured when an event is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub user_agent: String,
    pub ip_address: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub roles: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

/// What an event knows about the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ContextSnapshot {
    Request(RequestContext),
    /// Recorded outside of any request, e.g. startup or a sweeper task.
    Background { timestamp: DateTime<Utc> },
}

impl ContextSnapshot {
    pub fn background() -> Self {
        ContextSnapshot::Background {
            timestamp: Utc::now(),
        }
    }

    pub fn request(&self) -> Option<&RequestContext> {
        match self {
            ContextSnapshot::Request(ctx) => Some(ctx),
            ContextSnapshot::Background { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.request().and_then(|ctx| ctx.user_id.as_deref())
    }
}

/// Ordered key/value pairs attached to an operation scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeProperties(Vec<(String, serde_json::Value)>);

impl ScopeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for ScopeProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A named operation scope active when an event was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFrame {
    pub name: String,
    pub operation_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "ScopeProperties::is_empty")]
    pub properties: ScopeProperties,
}

impl OperationFrame {
    pub fn new(name: impl Into<String>, properties: ScopeProperties) -> Self {
        Self {
            name: name.into(),
            operation_id: Uuid::new_v4(),
            started_at: Utc::now(),
            properties,
        }
    }
}

/// Audit event entity. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_kind: AuditEventKind,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub request_context: ContextSnapshot,
    /// Enclosing operation scopes, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationFrame>,
}

impl AuditEvent {
    pub fn new(
        event_kind: AuditEventKind,
        severity: Severity,
        description: impl Into<String>,
        detail: Option<serde_json::Value>,
        request_context: ContextSnapshot,
        operations: Vec<OperationFrame>,
    ) -> Self {
        let actor_id = request_context.user_id().map(str::to_string);
        Self {
            event_id: Uuid::new_v4(),
            event_kind,
            severity,
            timestamp: Utc::now(),
            actor_id,
            description: description.into(),
            detail,
            request_context,
            operations,
        }
    }

    /// Innermost operation scope, if any.
    pub fn operation(&self) -> Option<&OperationFrame> {
        self.operations.last()
    }
}
