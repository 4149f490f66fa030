//! Shared-secret authentication gate

use crate::error::AuthError;

/// Optional shared-secret check applied to every tool call
#[derive(Clone)]
pub struct AuthGate {
    secret: Option<Vec<u8>>,
}

impl AuthGate {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(String::into_bytes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check a caller-presented token. Always passes when no secret is configured.
    pub fn check(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let presented = presented.ok_or(AuthError::MissingToken)?;

        if constant_time_eq(secret, presented.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Compare two byte strings without data-dependent early exit.
///
/// Unequal lengths are rejected up front; the length of the configured secret
/// is not treated as confidential.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b)
        .fold(0u8, |acc, (x, y)| std::hint::black_box(acc | (x ^ y)))
        == 0
}
