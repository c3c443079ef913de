use axum::http::{header, HeaderMap, Uri};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::audit::AuditTrail;
use super::blacklist::TokenBlacklist;
use super::error::{BlacklistError, ServiceError, TokenError};
use super::jwt::{JwtService, TokenSubject};
use crate::models::{ttl_seconds, Principal, SecurityEventType, TokenRecord};

pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Where a bearer token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    Query,
    Cookie,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Header => "header",
            TokenSource::Query => "query",
            TokenSource::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Find the bearer token: `Authorization` header, then the `access_token`
/// query parameter, then the `access_token` cookie.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<ExtractedToken> {
    from_authorization_header(headers)
        .map(|token| ExtractedToken {
            token,
            source: TokenSource::Header,
        })
        .or_else(|| {
            from_query(uri).map(|token| ExtractedToken {
                token,
                source: TokenSource::Query,
            })
        })
        .or_else(|| {
            from_cookie(headers).map(|token| ExtractedToken {
                token,
                source: TokenSource::Cookie,
            })
        })
}

fn from_authorization_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn from_query(uri: &Uri) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(uri.query()?).ok()?;
    pairs
        .into_iter()
        .find(|(key, value)| key == ACCESS_TOKEN_PARAM && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

fn from_cookie(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    let value = jar.get(ACCESS_TOKEN_PARAM)?.value().trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Per-request gate turning a bearer token into a [`Principal`].
#[derive(Clone)]
pub struct TokenAuthenticator {
    jwt: Arc<JwtService>,
    blacklist: Arc<dyn TokenBlacklist>,
    audit: AuditTrail,
    check_timeout: Duration,
}

impl TokenAuthenticator {
    pub fn new(
        jwt: Arc<JwtService>,
        blacklist: Arc<dyn TokenBlacklist>,
        audit: AuditTrail,
        check_timeout: Duration,
    ) -> Self {
        Self {
            jwt,
            blacklist,
            audit,
            check_timeout,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Authenticate a request from its headers and URI.
    ///
    /// `Ok(None)` means anonymous: no token, or a token that is invalid,
    /// expired or revoked. `Err` means the revocation store could not answer,
    /// and the token must not be trusted.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<Option<Principal>, BlacklistError> {
        match extract_token(headers, uri) {
            Some(extracted) => {
                tracing::debug!(source = extracted.source.as_str(), "Bearer token found");
                self.authenticate_token(&extracted.token).await
            }
            None => Ok(None),
        }
    }

    pub async fn authenticate_token(
        &self,
        token: &str,
    ) -> Result<Option<Principal>, BlacklistError> {
        let token_id = match self.jwt.peek_token_id(token) {
            Ok(token_id) => token_id,
            Err(e) => {
                self.record_invalid_token(&e, None).await;
                return Ok(None);
            }
        };

        if self.is_revoked(&token_id).await? {
            tracing::warn!(token_id = %token_id, "Revoked token presented");
            self.audit
                .security_event(
                    SecurityEventType::RevokedTokenUsage,
                    "Revoked token presented",
                    Some(json!({ "tokenId": token_id })),
                )
                .await;
            return Ok(None);
        }

        let principal = self
            .jwt
            .validate_access_token(token)
            .and_then(|claims| claims.to_principal());

        match principal {
            Ok(principal) => Ok(Some(principal)),
            Err(e) => {
                self.record_invalid_token(&e, Some(&token_id)).await;
                Ok(None)
            }
        }
    }

    /// Revoke an issued token until it would have expired anyway.
    pub async fn revoke(&self, record: &mut TokenRecord) -> Result<(), BlacklistError> {
        self.revoke_token_id(&record.token_id, &record.user_id, record.expires_at)
            .await?;
        record.revoke();
        Ok(())
    }

    pub async fn revoke_principal(&self, principal: &Principal) -> Result<(), BlacklistError> {
        self.revoke_token_id(
            principal.token_id(),
            principal.user_id(),
            principal.expires_at(),
        )
        .await
    }

    /// Revoke a raw token after checking it was issued by us.
    ///
    /// Expired tokens are accepted and ignored since they can no longer be used.
    pub async fn revoke_token(&self, token: &str) -> Result<(), ServiceError> {
        let claims = match self.jwt.validate_access_token(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.revoke_token_id(&claims.jti, &claims.sub, claims.expires_at()?)
            .await?;
        Ok(())
    }

    /// Revoke the presented token and issue a replacement with the same claims.
    pub async fn refresh(&self, principal: &Principal) -> Result<TokenRecord, ServiceError> {
        self.revoke_principal(principal).await?;
        let record = self.jwt.issue_access_token(&TokenSubject::from(principal))?;
        tracing::info!(
            user_id = %principal.user_id(),
            old_token_id = %principal.token_id(),
            new_token_id = %record.token_id,
            "Access token refreshed"
        );
        Ok(record)
    }

    async fn revoke_token_id(
        &self,
        token_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BlacklistError> {
        let Some(ttl_seconds) = ttl_seconds(expires_at, Utc::now()) else {
            tracing::debug!(token_id = %token_id, "Token already expired, not blacklisted");
            return Ok(());
        };

        match tokio::time::timeout(
            self.check_timeout,
            self.blacklist.blacklist_token(token_id, ttl_seconds),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, token_id = %token_id, "Failed to blacklist token");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(token_id = %token_id, "Blacklisting token timed out");
                return Err(BlacklistError::Timeout(self.check_timeout));
            }
        }

        self.audit
            .security_event(
                SecurityEventType::TokenRevoked,
                "Access token revoked",
                Some(json!({
                    "tokenId": token_id,
                    "userId": user_id,
                    "ttlSeconds": ttl_seconds,
                })),
            )
            .await;
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, BlacklistError> {
        let error = match tokio::time::timeout(
            self.check_timeout,
            self.blacklist.is_blacklisted(token_id),
        )
        .await
        {
            Ok(Ok(revoked)) => return Ok(revoked),
            Ok(Err(e)) => e,
            Err(_) => BlacklistError::Timeout(self.check_timeout),
        };

        tracing::error!(error = %error, token_id = %token_id, "Revocation check failed");
        self.audit
            .security_event(
                SecurityEventType::RevocationCheckFailed,
                "Revocation store could not be consulted",
                Some(json!({ "tokenId": token_id, "error": error.to_string() })),
            )
            .await;
        Err(error)
    }

    async fn record_invalid_token(&self, error: &TokenError, token_id: Option<&str>) {
        tracing::warn!(reason = error.code(), "Rejected bearer token");
        self.audit
            .security_event(
                SecurityEventType::InvalidTokenUsage,
                "Invalid bearer token presented",
                Some(json!({ "reason": error.code(), "tokenId": token_id })),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_header_wins_over_query_and_cookie() {
        let headers = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "access_token=from-cookie"),
        ]);
        let uri: Uri = "/x?access_token=from-query".parse().unwrap();

        let extracted = extract_token(&headers, &uri).unwrap();
        assert_eq!(extracted.token, "from-header");
        assert_eq!(extracted.source, TokenSource::Header);
    }

    #[test]
    fn test_query_wins_over_cookie() {
        let headers = headers(&[(header::COOKIE, "theme=dark; access_token=from-cookie")]);
        let uri: Uri = "/x?page=1&access_token=from-query".parse().unwrap();

        let extracted = extract_token(&headers, &uri).unwrap();
        assert_eq!(extracted.token, "from-query");
        assert_eq!(extracted.source, TokenSource::Query);
    }

    #[test]
    fn test_cookie_is_last_resort() {
        let headers = headers(&[(header::COOKIE, "theme=dark; access_token=from-cookie")]);
        let uri: Uri = "/x".parse().unwrap();

        let extracted = extract_token(&headers, &uri).unwrap();
        assert_eq!(extracted.token, "from-cookie");
        assert_eq!(extracted.source, TokenSource::Cookie);
    }

    #[test]
    fn test_scheme_is_case_insensitive_and_blank_values_ignored() {
        let uri: Uri = "/x?access_token=".parse().unwrap();
        let lower = headers(&[(header::AUTHORIZATION, "bearer abc")]);
        assert_eq!(extract_token(&lower, &uri).unwrap().token, "abc");

        let basic = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert!(extract_token(&basic, &uri).is_none());

        let blank = headers(&[(header::AUTHORIZATION, "Bearer   ")]);
        assert!(extract_token(&blank, &uri).is_none());
    }

    #[test]
    fn test_query_value_is_percent_decoded() {
        let uri: Uri = "/x?access_token=a%2Eb%2Ec".parse().unwrap();
        assert_eq!(extract_token(&HeaderMap::new(), &uri).unwrap().token, "a.b.c");
    }
}
