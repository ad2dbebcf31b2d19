//! Access credential gating session creation

use thiserror::Error;

/// Shortest token accepted as plausible
const MIN_LEN: usize = 8;

/// Characters of the token shown in debug output
const VISIBLE_PREFIX: usize = 5;

/// Missing or invalid-looking credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("an access token is required to open the map")]
    Missing,

    #[error("access token looks malformed: {0}")]
    Malformed(&'static str),
}

/// Provider access token, immutable for a session's lifetime
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validate a raw token as typed by the user
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CredentialError::Malformed("contains whitespace"));
        }
        if token.chars().count() < MIN_LEN {
            return Err(CredentialError::Malformed("too short"));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the full token
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
        write!(f, "Credential({}…)", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Credential::parse("   "), Err(CredentialError::Missing));
        assert_eq!(
            Credential::parse("pk.abc def"),
            Err(CredentialError::Malformed("contains whitespace"))
        );
        assert_eq!(Credential::parse("pk.x"), Err(CredentialError::Malformed("too short")));
        assert_eq!(Credential::parse(" pk.eyJ1Ijoi \n").unwrap().as_str(), "pk.eyJ1Ijoi");
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::parse("pk.eyJ1IjoiZGVtbyJ9.secret").unwrap();
        let shown = format!("{:?}", credential);
        assert_eq!(shown, "Credential(pk.ey…)");
        assert!(!shown.contains("secret"));
    }
}
