//! Opaque-token session gate.
//!
//! `authenticate` is the only way to obtain a token. Tokens are 32 random
//! bytes rendered as lowercase hex, live for the life of the process, and
//! are never persisted.

use std::collections::HashSet;

use parking_lot::RwLock;
use rand::RngCore;

use spg_domain::error::{ErrorKind, Result};

pub struct SessionGate {
    tokens: RwLock<HashSet<String>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashSet::new()),
        }
    }

    /// Mint a new session token and remember it.
    pub fn authenticate(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.tokens.write().insert(token.clone());
        tracing::info!("session authenticated");
        token
    }

    /// Membership test; absence or mismatch is an auth failure.
    pub fn validate(&self, token: &str) -> Result<()> {
        if self.tokens.read().contains(token) {
            Ok(())
        } else {
            Err(ErrorKind::AuthFailed(
                "missing or invalid session token; call authenticate first".into(),
            ))
        }
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_validate() {
        let gate = SessionGate::new();
        let token = gate.authenticate();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(gate.validate(&token).is_ok());
    }

    #[test]
    fn unknown_tokens_fail() {
        let gate = SessionGate::new();
        gate.authenticate();
        let err = gate.validate("deadbeef").unwrap_err();
        assert!(matches!(err, ErrorKind::AuthFailed(_)));
        assert!(gate.validate("").is_err());
    }

    #[test]
    fn tokens_are_distinct() {
        let gate = SessionGate::new();
        let a = gate.authenticate();
        let b = gate.authenticate();
        assert_ne!(a, b);
        assert!(gate.validate(&a).is_ok());
        assert!(gate.validate(&b).is_ok());
    }
}
