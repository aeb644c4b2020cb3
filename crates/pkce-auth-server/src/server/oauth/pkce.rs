//! PKCE (Proof Key for Code Exchange) generation and verification.
//!
//! Implements S256 per RFC 7636. The `plain` method is never accepted.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{EntropyError, OAuthError};

/// Random bytes behind every verifier and authorization code.
pub const ENTROPY_BYTES: usize = 32;

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Supported code challenge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`
    S256,
}

impl CodeChallengeMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            other => Err(OAuthError::unsupported_challenge_method(other)),
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns error if the random source cannot be read.
    pub fn generate() -> Result<Self, EntropyError> {
        let mut bytes = [0u8; ENTROPY_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self::from_entropy(&bytes))
    }

    /// Derive a pair from caller-supplied random bytes.
    #[must_use]
    pub fn from_entropy(bytes: &[u8]) -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = compute_s256(&verifier);
        Self { verifier, challenge }
    }
}

impl fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkcePair").field("challenge", &self.challenge).finish_non_exhaustive()
    }
}

/// Draw `ENTROPY_BYTES` from the OS and encode them base64url without padding.
///
/// # Errors
///
/// Returns error if the random source cannot be read.
pub fn random_urlsafe() -> Result<String, EntropyError> {
    let mut bytes = [0u8; ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn compute_s256(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a verifier against a stored challenge.
///
/// Only `S256` is accepted. Verifiers outside RFC 7636's length and
/// character rules never verify.
#[must_use]
pub fn verify(code_challenge: &str, method: &str, code_verifier: &str) -> bool {
    if method.parse::<CodeChallengeMethod>().is_err() || !is_valid_verifier(code_verifier) {
        return false;
    }
    constant_time_eq(&compute_s256(code_verifier), code_challenge)
}

/// Verify a PKCE S256 code challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    verify(code_challenge, CodeChallengeMethod::S256.as_str(), code_verifier)
}

fn is_valid_verifier(verifier: &str) -> bool {
    (VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Compare two strings in time that depends only on their length.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().iter().zip(b.as_bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
