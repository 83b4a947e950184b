//! Success token issuance
//!
//! Tokens are opaque strings of the form `{challenge}_{32 hex chars}`. The
//! random part is a UUIDv4 drawn from the OS CSPRNG, so a token cannot be
//! derived from the score or the time it was issued. Tokens are not stored
//! here; binding and validation belong to the verification backend.

use uuid::Uuid;

use crate::types::ChallengeType;

/// Mints success tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenIssuer;

impl TokenIssuer {
    pub fn new() -> Self {
        Self
    }

    /// Issue a fresh token for a passed challenge
    pub fn issue(&self, kind: ChallengeType) -> String {
        format!("{}_{}", kind.as_str(), Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_format() {
        let token = TokenIssuer::new().issue(ChallengeType::Behavioral);
        let (prefix, random) = token.split_once('_').unwrap();

        assert_eq!(prefix, "behavioral");
        assert_eq!(random.len(), 32);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = TokenIssuer::new();
        let tokens: HashSet<String> = (0..1000)
            .map(|_| issuer.issue(ChallengeType::Traditional))
            .collect();
        assert_eq!(tokens.len(), 1000);
    }
}
