//! Session name type.

use std::fmt;
use std::str::FromStr;

use crate::error::HubError;

/// Maximum accepted length of a session name, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// User-supplied identifier of a session.
///
/// Names are trimmed on construction and must be non-empty afterwards.
/// They double as directory names inside the credential store, so path
/// separators, `.`/`..`, and control characters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionName(String);

impl SessionName {
    /// Validate and construct a session name.
    pub fn new(raw: &str) -> Result<Self, HubError> {
        let trimmed = raw.trim();
        let invalid = |reason| HubError::InvalidName {
            name: raw.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("empty"));
        }
        if trimmed.len() > MAX_NAME_LEN {
            return Err(invalid("too long"));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(invalid("reserved"));
        }
        if trimmed
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(invalid("contains a path separator or control character"));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionName {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
