//! Session identifiers.
//!
//! Identifiers are 32 bytes drawn from the operating system's CSPRNG and
//! encoded as URL-safe base64 without padding, which gives a 43 character
//! token that is safe to put in cookies, headers and URLs.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// Number of random bytes behind each identifier.
pub const ID_ENTROPY_BYTES: usize = 32;

/// Opaque, unguessable handle to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Source of fresh session identifiers.
///
/// The store calls this once per `create` attempt. Implementations must be
/// unpredictable; uniqueness against live sessions is checked by the store.
pub trait IdSource: Send + Sync {
    /// Produce a new identifier.
    fn generate(&self) -> Result<SessionId>;
}

/// Identifier source backed by the operating system's random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomIds;

impl IdSource for OsRandomIds {
    fn generate(&self) -> Result<SessionId> {
        let mut bytes = [0u8; ID_ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::IdentifierGeneration(e.to_string()))?;
        Ok(SessionId(URL_SAFE_NO_PAD.encode(bytes)))
    }
}
