//! Owner identities as handed to us by the identity proxy.

use std::fmt;

use serde::Serialize;

use crate::constants::MAX_OWNER_ID_LEN;

/// Opaque id of the signed-in user a comic and its credits belong to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OwnerId(String);

/// Why an owner id was rejected
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOwnerId {
    /// Nothing left after trimming
    #[error("owner id is empty")]
    Empty,
    /// Longer than [MAX_OWNER_ID_LEN]
    #[error("owner id is longer than {MAX_OWNER_ID_LEN} characters")]
    TooLong,
    /// Contains whitespace or control characters
    #[error("owner id contains invalid characters")]
    InvalidCharacters,
}

impl OwnerId {
    /// Validates and wraps an owner id.
    pub fn new(value: &str) -> Result<Self, InvalidOwnerId> {
        let value = value.trim();
        if value.is_empty() {
            return Err(InvalidOwnerId::Empty);
        }
        if value.len() > MAX_OWNER_ID_LEN {
            return Err(InvalidOwnerId::TooLong);
        }
        if value
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
        {
            return Err(InvalidOwnerId::InvalidCharacters);
        }
        Ok(Self(value.to_string()))
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OwnerId {
    type Err = InvalidOwnerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
