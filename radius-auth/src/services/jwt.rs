use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use uuid::Uuid;

use super::error::TokenError;
use crate::config::{JwtConfig, JwtSigning};
use crate::models::{Principal, TokenRecord};

/// JWT service for token issuance and validation
#[derive(Clone)]
pub struct JwtService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
    audience: Option<String>,
    access_token_expiry_minutes: i64,
    leeway_seconds: u64,
}

/// Claims for access tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Login name
    #[serde(default)]
    pub unique_name: String,
    #[serde(
        rename = "role",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub roles: Vec<String>,
    #[serde(
        rename = "permission",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub permissions: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// JWT ID (revocation key)
    #[serde(default)]
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl AccessTokenClaims {
    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        DateTime::from_timestamp(self.exp, 0)
            .ok_or_else(|| TokenError::MalformedClaims("exp out of range".to_string()))
    }

    pub fn to_principal(&self) -> Result<Principal, TokenError> {
        let username = if self.unique_name.is_empty() {
            self.sub.clone()
        } else {
            self.unique_name.clone()
        };
        Ok(
            Principal::new(self.sub.clone(), username, self.jti.clone(), self.expires_at()?)
                .with_roles(self.roles.iter().cloned())
                .with_permissions(self.permissions.iter().cloned()),
        )
    }
}

/// Identity and claims a new access token is issued for.
#[derive(Debug, Clone, Default)]
pub struct TokenSubject {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl From<&Principal> for TokenSubject {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id().to_string(),
            username: principal.username().to_string(),
            roles: principal.roles().iter().cloned().collect(),
            permissions: principal.permissions().iter().cloned().collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[derive(Deserialize)]
struct TokenIdClaim {
    #[serde(default)]
    jti: Option<String>,
}

impl JwtService {
    /// Create a JWT service from configuration, loading RSA keys from files when configured
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let (algorithm, encoding_key, decoding_key) = match &config.signing {
            JwtSigning::Secret(secret) => {
                let bytes = secret.expose_secret().as_bytes();
                if bytes.is_empty() {
                    return Err(anyhow::anyhow!("JWT secret must not be empty"));
                }
                tracing::info!("JWT service initialized with HS256 secret");
                (
                    Algorithm::HS256,
                    EncodingKey::from_secret(bytes),
                    DecodingKey::from_secret(bytes),
                )
            }
            JwtSigning::RsaKeyFiles {
                private_key_path,
                public_key_path,
            } => {
                let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to read private key from {}: {}",
                        private_key_path,
                        e
                    )
                })?;
                let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

                let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
                    anyhow::anyhow!("Failed to read public key from {}: {}", public_key_path, e)
                })?;
                let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

                tracing::info!("JWT service initialized with RS256 keys");
                (Algorithm::RS256, encoding_key, decoding_key)
            }
        };

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            leeway_seconds: config.leeway_seconds,
        })
    }

    /// Issue a signed access token and its lifecycle record
    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<TokenRecord, TokenError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: subject.user_id.clone(),
            unique_name: subject.username.clone(),
            roles: subject.roles.clone(),
            permissions: subject.permissions.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: Some(now.timestamp()),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = self.sign(&claims)?;

        Ok(TokenRecord {
            token,
            token_id: claims.jti.clone(),
            user_id: claims.sub.clone(),
            expires_at: claims.expires_at()?,
            revoked: false,
        })
    }

    /// Sign an arbitrary claim set with the configured key
    pub fn sign(&self, claims: &AccessTokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Validate signature, time claims, issuer and audience
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?.claims;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::MalformedClaims("empty sub".to_string()));
        }
        if claims.jti.trim().is_empty() {
            return Err(TokenError::MalformedClaims("missing jti".to_string()));
        }

        Ok(claims)
    }

    /// Read the `jti` claim without verifying the signature.
    ///
    /// Only suitable for keying the revocation lookup; the token must still go
    /// through [`JwtService::validate_access_token`] before it is trusted.
    pub fn peek_token_id(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claim = decode::<TokenIdClaim>(token, &self.decoding_key, &validation)?.claims;
        claim
            .jti
            .filter(|jti| !jti.trim().is_empty())
            .ok_or_else(|| TokenError::MalformedClaims("missing jti".to_string()))
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}
