//! Bearer token issued by the external identity provider

use std::fmt;

/// Session token attached as `Authorization: Bearer <token>` on protected calls.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// `None` for an empty or whitespace-only token
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token() {
        assert!(AuthToken::new("  ").is_none());
        let token = AuthToken::new(" abc ").unwrap();
        assert_eq!(token.header_value(), "Bearer abc");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
    }
}
