//! PKCE (RFC 7636) verifier and S256 challenge generation for the client side
//! of the authorization code flow.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// The only challenge method this client sends.
pub const CHALLENGE_METHOD_S256: &str = "S256";

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised when restoring a parked verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    #[error("Verifier length {0} is outside 43..=128")]
    InvalidLength(usize),

    #[error("Verifier contains characters outside the unreserved set")]
    InvalidCharacters,
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// High-entropy code verifier, kept server-side until the code exchange.
#[derive(Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Restores a verifier from its stored form.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid RFC 7636 verifier.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidLength(len));
        }
        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generates 32 random bytes encoded as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `BASE64URL(SHA256(ASCII(code_verifier)))`.
    #[must_use]
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PkceVerifier(..)")
    }
}

// =============================================================================
// Tests
// =============================================================================
