use core::fmt;
use std::sync::Arc;

use rand::{Rng, distr::Alphanumeric};

/// Length of generated owner tokens. 32 alphanumeric characters carry about
/// 190 bits of entropy.
pub const OWNER_TOKEN_LEN: usize = 32;

/// Identifies one coordinator in the `owner_token` column.
///
/// Tokens are random per coordinator, so a restarted process never mistakes
/// its predecessor's row for its own.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(Arc<str>);

impl OwnerToken {
    /// Draws a fresh random token.
    pub fn generate() -> Self {
        let token: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(OWNER_TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerToken {
    fn from(token: &str) -> Self {
        Self(token.into())
    }
}

impl From<String> for OwnerToken {
    fn from(token: String) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnerToken").field(&&*self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_alphanumeric_and_distinct() {
        let a = OwnerToken::generate();
        let b = OwnerToken::generate();
        assert_eq!(a.as_str().len(), OWNER_TOKEN_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
