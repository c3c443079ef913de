use jsonwebtoken::errors::ErrorKind;
use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

/// TOTP failures that are the caller's fault. A malformed *code* is not an
/// error; validation simply answers `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TotpError {
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("Timestamp precedes the Unix epoch")]
    InvalidTimestamp,

    #[error("HMAC failure: {0}")]
    Crypto(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Invalid token audience")]
    InvalidAudience,

    #[error("Malformed token claims: {0}")]
    MalformedClaims(String),

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short machine-readable label used in audit details.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Expired => "expired",
            TokenError::NotYetValid => "not_yet_valid",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::InvalidIssuer => "invalid_issuer",
            TokenError::InvalidAudience => "invalid_audience",
            TokenError::MalformedClaims(_) => "malformed_claims",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenError::InvalidSignature,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            ErrorKind::InvalidAudience => TokenError::InvalidAudience,
            ErrorKind::MissingRequiredClaim(claim) => {
                TokenError::MalformedClaims(format!("missing required claim '{}'", claim))
            }
            _ => TokenError::MalformedClaims(err.to_string()),
        }
    }
}

/// The revocation store could not answer. Distinct from "not revoked".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("Revocation store did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for BlacklistError {
    fn from(err: redis::RedisError) -> Self {
        BlacklistError::Unavailable(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    #[error("Permission requirement must not be empty")]
    EmptyPermission,

    #[error("Permission '{0}' is not of the form resource.action")]
    MalformedPermission(String),

    #[error("Role requirement must name at least one role")]
    EmptyRoleSet,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Totp(#[from] TotpError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Blacklist(#[from] BlacklistError),

    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Totp(TotpError::InvalidSecret(_)) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid TOTP secret"))
            }
            ServiceError::Totp(e) => AppError::InternalError(anyhow::Error::new(e)),
            ServiceError::Token(_) => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::Blacklist(e) => AppError::ServiceUnavailable(e.to_string()),
            ServiceError::Requirement(e) => AppError::BadRequest(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_blacklist_failure_maps_to_service_unavailable() {
        let err: AppError =
            ServiceError::from(BlacklistError::Timeout(Duration::from_millis(500))).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_token_failure_hides_reason() {
        let err: AppError = ServiceError::from(TokenError::InvalidSignature).into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!err.to_string().contains("signature"));
    }

    #[test]
    fn test_expired_jwt_error_is_classified() {
        let err = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature);
        assert_eq!(TokenError::from(err), TokenError::Expired);
    }
}
