use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

const TOKEN_LEN: usize = 32;

/// An opaque bearer token granting access to a token-gated feed.
/// Tied to exactly one subscription; matched exactly and case-sensitively.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AccessToken(String);

impl AccessToken {
    /// Mint a fresh token for a new subscription
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl FromStr for AccessToken {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // The token is opaque, but a well-formed one is always 32
        // alphanumeric characters. Rejecting anything else up front keeps
        // arbitrary path input out of store queries and log lines.
        if value.len() != TOKEN_LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err("Malformed access token".into());
        }

        Ok(Self(value.to_string()))
    }
}

impl AsRef<str> for AccessToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
