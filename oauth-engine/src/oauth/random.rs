//! Opaque Token Generation
//!
//! Codes and tokens are sampled from a 64-symbol URL-safe alphabet using the
//! operating system CSPRNG. Because 64 divides 256, reducing a random byte
//! modulo the alphabet size is exactly uniform.

use rand::{RngCore, rngs::OsRng};

use crate::oauth::error::OAuthError;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Source of unguessable opaque strings
pub trait TokenGenerator: Send + Sync {
    /// Generate a string of exactly `length` characters.
    fn generate(&self, length: usize) -> Result<String, OAuthError>;
}

/// CSPRNG-backed generator using [`OsRng`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl RandomTokenGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self, length: usize) -> Result<String, OAuthError> {
        let mut bytes = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| OAuthError::server_error(format!("randomness unavailable: {}", e)))?;

        Ok(bytes
            .iter()
            .map(|b| CHARSET[(*b as usize) % CHARSET.len()] as char)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_charset_is_bias_free() {
        assert_eq!(CHARSET.len(), 64);
        assert_eq!(256 % CHARSET.len(), 0);
    }

    #[test]
    fn test_generate_token_length() {
        let generator = RandomTokenGenerator::new();
        assert_eq!(generator.generate(32).unwrap().len(), 32);
        assert_eq!(generator.generate(64).unwrap().len(), 64);
    }

    #[test]
    fn test_generate_token_charset() {
        let token = RandomTokenGenerator.generate(256).unwrap();
        for c in token.chars() {
            assert!(c.is_ascii_alphanumeric() || c == '-' || c == '_');
        }
    }

    #[test]
    fn test_tokens_are_unique() {
        let generator = RandomTokenGenerator;
        let tokens: HashSet<String> = (0..1000).map(|_| generator.generate(32).unwrap()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
