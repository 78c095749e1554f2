//! PKCE (Proof Key for Code Exchange) Implementation
//!
//! RFC 7636: Proof Key for Code Exchange by OAuth Public Clients.
//! Both `S256` and `plain` are accepted; any other method never verifies.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// PKCE code challenge method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkceMethod {
    /// `BASE64URL(SHA256(ASCII(code_verifier))) == code_challenge`
    S256,
    /// `code_verifier == code_challenge`
    Plain,
}

impl PkceMethod {
    /// Parse the `code_challenge_method` parameter. Matching is case-sensitive.
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "S256" => Some(Self::S256),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verifies code verifiers against stored challenges
#[derive(Debug, Clone, Copy, Default)]
pub struct PkceVerifier;

impl PkceVerifier {
    /// Verify `code_verifier` against `code_challenge` using the named method.
    ///
    /// Unknown methods are rejected rather than falling back to `plain`.
    pub fn verify(code_verifier: &str, code_challenge: &str, method: &str) -> bool {
        match PkceMethod::parse(method) {
            Some(method) => Self::verify_with(code_verifier, code_challenge, method),
            None => false,
        }
    }

    /// Verify with an already parsed method.
    pub fn verify_with(code_verifier: &str, code_challenge: &str, method: PkceMethod) -> bool {
        match method {
            PkceMethod::S256 => {
                let computed = s256_challenge(code_verifier);
                constant_time_eq(&computed, code_challenge)
            }
            PkceMethod::Plain => constant_time_eq(code_verifier, code_challenge),
        }
    }
}

/// Compute the `S256` challenge for a verifier.
pub fn s256_challenge(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
