//! Random token generation for `state` and `nonce` parameters.
//!
//! Tokens are drawn from the operating system CSPRNG. They are a security
//! boundary, so nothing here accepts a seed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

/// Text encoding applied to the random bytes of a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenEncoding {
    /// Lowercase hex, two characters per byte.
    #[default]
    Hex,
    /// Base64url without padding.
    Base64Url,
}

/// Generator for URL-safe random tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceGenerator {
    byte_length: usize,
    encoding: TokenEncoding,
}

impl NonceGenerator {
    /// 32 random bytes, 64 hex characters.
    pub const DEFAULT_BYTE_LENGTH: usize = 32;

    /// Create a generator producing hex tokens of the default length.
    pub fn new() -> Self {
        Self {
            byte_length: Self::DEFAULT_BYTE_LENGTH,
            encoding: TokenEncoding::Hex,
        }
    }

    /// Set how many random bytes back each token. Zero is raised to one.
    pub fn with_byte_length(mut self, byte_length: usize) -> Self {
        self.byte_length = byte_length.max(1);
        self
    }

    /// Set the token encoding.
    pub fn with_encoding(mut self, encoding: TokenEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Generate a fresh token.
    pub fn generate(&self) -> String {
        let mut random_bytes = vec![0u8; self.byte_length];
        OsRng.fill_bytes(&mut random_bytes);

        match self.encoding {
            TokenEncoding::Hex => hex::encode(random_bytes),
            TokenEncoding::Base64Url => URL_SAFE_NO_PAD.encode(random_bytes),
        }
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a hex token carrying `byte_length` bytes of entropy.
pub fn generate(byte_length: usize) -> String {
    NonceGenerator::new().with_byte_length(byte_length).generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_token_is_64_hex_characters() {
        let token = NonceGenerator::new().generate();
        assert_eq!(token.len(), 64); // 32 bytes hex encoded
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_respects_byte_length() {
        assert_eq!(generate(16).len(), 32);
        assert_eq!(generate(64).len(), 128);
    }

    #[test]
    fn test_zero_length_is_clamped() {
        let generator = NonceGenerator::new().with_byte_length(0);
        assert_eq!(generator.byte_length(), 1);
        assert_eq!(generator.generate().len(), 2);
    }

    #[test]
    fn test_base64url_tokens_are_url_safe() {
        let generator = NonceGenerator::new().with_encoding(TokenEncoding::Base64Url);
        let token = generator.generate();

        assert_eq!(token.len(), 43); // 32 bytes, unpadded
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let generator = NonceGenerator::new();
        let tokens: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
