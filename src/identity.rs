//! Physical identity matching.
//!
//! A token proves who the link was issued to, not who is holding the phone.
//! The holder must also scan a physical ID whose value equals the identity
//! bound to the token's subject.

use crate::error::IdentityError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Three uppercase letters, a slash, six digits. ASCII only.
static IDENTITY_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}/[0-9]{6}$").expect("identity pattern is valid"));

/// A scanned identity that passed format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedIdentity(String);

impl ScannedIdentity {
    /// Validate a decoded scan. Surrounding whitespace from the scanner is
    /// dropped; anything else that deviates from `ABC/123456` is rejected.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let candidate = raw.trim();
        if !IDENTITY_FORMAT.is_match(candidate) {
            return Err(IdentityError::FormatInvalid);
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScannedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compares scanned identities with the identity bound to a subject.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMatcher;

impl IdentityMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Format check followed by exact comparison.
    pub fn match_identity(
        &self,
        scanned: &str,
        bound_identity: &str,
    ) -> Result<ScannedIdentity, IdentityError> {
        let scanned = ScannedIdentity::parse(scanned)?;
        self.match_bound(&scanned, bound_identity)?;
        Ok(scanned)
    }

    /// Exact, case-sensitive comparison of an already validated scan.
    pub fn match_bound(
        &self,
        scanned: &ScannedIdentity,
        bound_identity: &str,
    ) -> Result<(), IdentityError> {
        if constant_time_eq(scanned.as_str().as_bytes(), bound_identity.as_bytes()) {
            Ok(())
        } else {
            Err(IdentityError::Mismatch)
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
