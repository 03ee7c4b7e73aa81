//! Attendance token verification.
//!
//! Tokens are compact JWS strings (`header.payload.signature`) signed with
//! HMAC-SHA256 by the notification subsystem. Verification runs in a fixed
//! order: structure, signature, expiry, required claims.

use crate::error::TokenError;
use crate::types::{SessionId, SubjectId};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of dot-separated segments in a compact JWS.
const TOKEN_SEGMENTS: usize = 3;

/// Verified, strictly typed token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    pub subject_id: SubjectId,
    pub session_id: SessionId,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Payload as it comes off the wire. Every field is optional so that a
/// missing claim is reported as such instead of as a JSON error.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default, alias = "subject_id")]
    sub: Option<Value>,
    #[serde(default, alias = "sessionId")]
    session_id: Option<Value>,
    #[serde(default)]
    iat: Option<Value>,
    #[serde(default)]
    exp: Option<Value>,
}

/// Verifies attendance tokens against the server-held secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &SecretString) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock, not the library's.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            decoding_key,
            validation,
        }
    }

    /// Verify `raw_token` as of `now` and extract its claims.
    pub fn verify(&self, raw_token: &str, now: DateTime<Utc>) -> Result<ClaimSet, TokenError> {
        // 1. Structure
        let segments: Vec<&str> = raw_token.split('.').collect();
        if segments.len() != TOKEN_SEGMENTS {
            return Err(TokenError::Malformed(format!(
                "expected {} segments, got {}",
                TOKEN_SEGMENTS,
                segments.len()
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TokenError::Malformed("empty segment".to_string()));
        }

        // 2. Signature
        let token_data = decode::<RawClaims>(raw_token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::InvalidToken => TokenError::Malformed("invalid token".to_string()),
                ErrorKind::Base64(_) => TokenError::Malformed("invalid base64".to_string()),
                ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    TokenError::Malformed("invalid JSON".to_string())
                }
                _ => TokenError::Malformed("undecodable token".to_string()),
            })?;
        let raw = token_data.claims;

        // 3. Expiry, strictly before `exp`
        let expires_at = raw
            .exp
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
            .ok_or(TokenError::MissingClaims { claim: "exp" })?;
        if now >= expires_at {
            debug!(
                "Token {} expired at {} (now {})",
                token_fingerprint(raw_token),
                expires_at,
                now
            );
            return Err(TokenError::Expired {
                expired_at: expires_at.timestamp(),
            });
        }

        // 4. Required claims
        let subject_id = raw
            .sub
            .as_ref()
            .and_then(id_claim)
            .map(SubjectId::new)
            .ok_or(TokenError::MissingClaims { claim: "sub" })?;
        let session_id = raw
            .session_id
            .as_ref()
            .and_then(id_claim)
            .map(SessionId::new)
            .ok_or(TokenError::MissingClaims {
                claim: "session_id",
            })?;
        let issued_at = raw
            .iat
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0));

        Ok(ClaimSet {
            subject_id,
            session_id,
            issued_at,
            expires_at,
        })
    }
}

/// Identifiers are accepted as non-empty strings or non-negative integers.
fn id_claim(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => n.as_u64().map(|id| id.to_string()),
        _ => None,
    }
}

/// Short, non-reversible reference to a token for log lines.
pub fn token_fingerprint(raw_token: &str) -> String {
    let hash = Sha256::digest(raw_token.as_bytes());
    hex::encode(&hash[..8])
}
