//! RFC 6238 time-based one-time passwords.
//!
//! Codes are always six digits over a 30 second step, signed with
//! HMAC-SHA1. Secrets travel as unpadded RFC 4648 Base32.

use base32::Alphabet;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use std::fmt;
use subtle::ConstantTimeEq;

use super::error::TotpError;
use crate::config::TotpConfig;

type HmacSha1 = Hmac<Sha1>;

pub const CODE_DIGITS: usize = 6;
pub const STEP_SECONDS: u64 = 30;
pub const DEFAULT_WINDOW: u32 = 1;

const SECRET_BYTES: usize = 32;
const CODE_MODULUS: u32 = 1_000_000;
const BASE32: Alphabet = Alphabet::Rfc4648 { padding: false };

/// Per-user enrollment secret.
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret {
    bytes: Vec<u8>,
    base32: String,
    created_at: DateTime<Utc>,
}

impl TotpSecret {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        let base32 = base32::encode(BASE32, &bytes);
        Self {
            bytes,
            base32,
            created_at: Utc::now(),
        }
    }

    /// Parse a stored or user-typed secret. Case, whitespace and `=` padding
    /// are ignored; any other character outside the Base32 alphabet is
    /// rejected.
    pub fn from_base32(encoded: &str) -> Result<Self, TotpError> {
        let normalized: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.is_empty() {
            return Err(TotpError::InvalidSecret("secret is empty".to_string()));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !matches!(c, 'A'..='Z' | '2'..='7'))
        {
            return Err(TotpError::InvalidSecret(format!(
                "invalid Base32 character '{}'",
                bad
            )));
        }

        let bytes = base32::decode(BASE32, &normalized)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TotpError::InvalidSecret("undecodable Base32".to_string()))?;

        Ok(Self {
            bytes,
            base32: normalized,
            created_at: Utc::now(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base32(&self) -> &str {
        &self.base32
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("bytes", &"[redacted]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Generate a fresh secret from the operating system's CSPRNG.
pub fn generate_secret() -> TotpSecret {
    let mut bytes = vec![0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    TotpSecret::from_bytes(bytes)
}

/// Build the `otpauth://` URI understood by authenticator apps.
pub fn enrollment_uri(account: &str, secret: &str, issuer: &str) -> String {
    let issuer = urlencoding::encode(issuer);
    let account = urlencoding::encode(account);
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&digits={CODE_DIGITS}&period={STEP_SECONDS}"
    )
}

/// Code for the 30 second step containing `timestamp`.
pub fn generate_code(secret: &str, timestamp: DateTime<Utc>) -> Result<String, TotpError> {
    let secret = TotpSecret::from_base32(secret)?;
    let code = hotp(secret.as_bytes(), time_step(timestamp)?)?;
    Ok(format_code(code))
}

/// Validate `code` against the current time.
pub fn validate_code(secret: &str, code: &str, window: u32) -> Result<bool, TotpError> {
    validate_code_at(secret, code, Utc::now(), window)
}

pub fn validate_code_at(
    secret: &str,
    code: &str,
    timestamp: DateTime<Utc>,
    window: u32,
) -> Result<bool, TotpError> {
    Ok(matching_step(secret, code, timestamp, window)?.is_some())
}

/// The time step in `[current - window, current + window]` whose code equals
/// `code`, if any. Callers that persist the last accepted step can use it to
/// refuse a replayed code.
///
/// Anything other than exactly six ASCII digits is rejected before the
/// secret is even looked at.
pub fn matching_step(
    secret: &str,
    code: &str,
    timestamp: DateTime<Utc>,
    window: u32,
) -> Result<Option<u64>, TotpError> {
    if !is_well_formed(code) {
        return Ok(None);
    }

    let secret = TotpSecret::from_base32(secret)?;
    let current = time_step(timestamp)?;
    let first = current.saturating_sub(u64::from(window));
    let last = current.saturating_add(u64::from(window));

    for step in first..=last {
        let candidate = format_code(hotp(secret.as_bytes(), step)?);
        if bool::from(candidate.as_bytes().ct_eq(code.as_bytes())) {
            return Ok(Some(step));
        }
    }
    Ok(None)
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

fn time_step(timestamp: DateTime<Utc>) -> Result<u64, TotpError> {
    u64::try_from(timestamp.timestamp())
        .map(|secs| secs / STEP_SECONDS)
        .map_err(|_| TotpError::InvalidTimestamp)
}

/// HOTP (RFC 4226) with dynamic truncation, reduced to six digits.
fn hotp(key: &[u8], counter: u64) -> Result<u32, TotpError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| TotpError::Crypto(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = usize::from(hash[hash.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        hash[offset],
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]) & 0x7fff_ffff;

    Ok(binary % CODE_MODULUS)
}

fn format_code(code: u32) -> String {
    format!("{:0width$}", code, width = CODE_DIGITS)
}

/// Result of starting a 2FA enrollment. The caller persists `secret`.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    pub secret: TotpSecret,
    pub uri: String,
}

/// TOTP operations bound to the configured issuer and drift window.
#[derive(Debug, Clone)]
pub struct TotpEngine {
    issuer: String,
    window: u32,
}

impl TotpEngine {
    pub fn new(issuer: impl Into<String>, window: u32) -> Self {
        Self {
            issuer: issuer.into(),
            window,
        }
    }

    pub fn from_config(config: &TotpConfig) -> Self {
        Self::new(config.issuer.clone(), config.window)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn enroll(&self, account: &str) -> TotpEnrollment {
        let secret = generate_secret();
        let uri = enrollment_uri(account, secret.base32(), &self.issuer);
        tracing::debug!(account = %account, "Generated TOTP enrollment secret");
        TotpEnrollment { secret, uri }
    }

    pub fn verify(&self, secret: &str, code: &str) -> Result<bool, TotpError> {
        validate_code(secret, code, self.window)
    }
}

impl Default for TotpEngine {
    fn default() -> Self {
        Self::new("RADIUS Admin", DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Base32 of the RFC 6238 SHA1 seed "12345678901234567890".
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_rfc6238_reference_vector() {
        assert_eq!(generate_code(RFC_SECRET, at(59)).unwrap(), "287082");
    }

    #[test]
    fn test_rfc6238_later_vectors() {
        // Last six digits of the published 8-digit SHA1 vectors.
        assert_eq!(generate_code(RFC_SECRET, at(1_111_111_109)).unwrap(), "081804");
        assert_eq!(generate_code(RFC_SECRET, at(1_234_567_890)).unwrap(), "005924");
        assert_eq!(generate_code(RFC_SECRET, at(2_000_000_000)).unwrap(), "279037");
    }

    #[test]
    fn test_same_step_same_code() {
        let secret = generate_secret();
        let a = generate_code(secret.base32(), at(1_700_000_010)).unwrap();
        let b = generate_code(secret.base32(), at(1_700_000_019)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), CODE_DIGITS);
        assert!(a.bytes().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_window_tolerates_one_step_of_drift() {
        let secret = generate_secret();
        let now = at(1_700_000_000);
        for offset in [-30, 0, 30] {
            let code = generate_code(secret.base32(), now + Duration::seconds(offset)).unwrap();
            assert!(validate_code_at(secret.base32(), &code, now, 1).unwrap());
        }
        for offset in [-90, 90] {
            let code = generate_code(secret.base32(), now + Duration::seconds(offset)).unwrap();
            assert!(!validate_code_at(secret.base32(), &code, now, 1).unwrap());
        }
    }

    #[test]
    fn test_matching_step_reports_counter() {
        let now = at(1_700_000_000);
        let code = generate_code(RFC_SECRET, now - Duration::seconds(30)).unwrap();
        let step = matching_step(RFC_SECRET, &code, now, 1).unwrap();
        assert_eq!(step, Some(1_700_000_000 / 30 - 1));
    }

    #[test]
    fn test_malformed_codes_are_rejected() {
        let now = at(59);
        for code in ["", "28708", "2870822", "28708a", " 287082", "２８７０８２"] {
            assert!(!validate_code_at(RFC_SECRET, code, now, 1).unwrap());
            assert!(!validate_code_at("not base32!", code, now, 5).unwrap());
        }
    }

    #[test]
    fn test_invalid_secret_is_a_distinct_error() {
        let result = generate_code("ABC1", at(59));
        assert!(matches!(result, Err(TotpError::InvalidSecret(_))));
        let result = validate_code_at("ABC!DEF", "123456", at(59), 1);
        assert!(matches!(result, Err(TotpError::InvalidSecret(_))));
    }

    #[test]
    fn test_secret_parsing_is_lenient_about_presentation() {
        let parsed = TotpSecret::from_base32("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap();
        assert_eq!(parsed.base32(), RFC_SECRET);
        assert_eq!(parsed.as_bytes(), b"12345678901234567890");
    }

    #[test]
    fn test_generated_secret_has_full_entropy() {
        let secret = generate_secret();
        assert_eq!(secret.as_bytes().len(), SECRET_BYTES);
        assert!(!secret.base32().contains('='));
        let parsed = TotpSecret::from_base32(secret.base32()).unwrap();
        assert_eq!(parsed.as_bytes(), secret.as_bytes());
        assert_ne!(generate_secret().as_bytes(), secret.as_bytes());
    }

    #[test]
    fn test_pre_epoch_timestamp_is_rejected() {
        assert_eq!(
            generate_code(RFC_SECRET, at(-1)),
            Err(TotpError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_enrollment_uri_encodes_labels() {
        let uri = enrollment_uri("ops@example.com", "JBSWY3DP", "RADIUS Admin");
        assert_eq!(
            uri,
            "otpauth://totp/RADIUS%20Admin:ops%40example.com?secret=JBSWY3DP&issuer=RADIUS%20Admin&digits=6&period=30"
        );
    }

    #[test]
    fn test_engine_round_trip() {
        let engine = TotpEngine::new("RADIUS Admin", 1);
        let enrollment = engine.enroll("alice");
        assert!(enrollment.uri.starts_with("otpauth://totp/RADIUS%20Admin:alice?secret="));
        let code = generate_code(enrollment.secret.base32(), Utc::now()).unwrap();
        assert!(engine.verify(enrollment.secret.base32(), &code).unwrap());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let secret = TotpSecret::from_base32(RFC_SECRET).unwrap();
        assert!(!format!("{:?}", secret).contains(RFC_SECRET));
    }
}
