//! Self-asserted participant identities of the form `name#DDDD`.
//!
//! The discriminator is four decimal digits picked from a uniform random
//! source when the identity is created, so reused names are unlikely to
//! collide. Identities are opaque routing keys to the relay; only the
//! endpoints attach meaning to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Minimum length of the name part.
pub const MIN_NAME_LEN: usize = 3;
/// Maximum length of the name part.
pub const MAX_NAME_LEN: usize = 20;
/// The discriminator is always exactly four decimal digits.
pub const DISCRIMINATOR_LEN: usize = 4;

/// A validated `name#DDDD` identity string.
///
/// `Ord` is the plain string order; the mutual-invite tie-break in the
/// handshake relies on it being total and identical on both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a name and a numeric discriminator.
    pub fn new(name: &str, discriminator: u16) -> Result<Self, ProtocolError> {
        validate_name(name)?;
        if discriminator > 9999 {
            return Err(ProtocolError::InvalidIdentity(format!(
                "discriminator {} out of range 0000-9999",
                discriminator
            )));
        }
        Ok(Self(format!("{}#{:04}", name, discriminator)))
    }

    /// The name part, without the `#DDDD` suffix.
    pub fn name(&self) -> &str {
        &self.0[..self.0.len() - DISCRIMINATOR_LEN - 1]
    }

    /// The four-digit discriminator part.
    pub fn discriminator(&self) -> &str {
        &self.0[self.0.len() - DISCRIMINATOR_LEN..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check that a bare name is acceptable: 3-20 ASCII lowercase alphanumerics.
pub fn validate_name(name: &str) -> Result<(), ProtocolError> {
    let len = name.chars().count();
    if len < MIN_NAME_LEN || len > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidIdentity(format!(
            "name must be {}-{} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ProtocolError::InvalidIdentity(
            "name must be lowercase alphanumeric".into(),
        ));
    }
    Ok(())
}

impl FromStr for Identity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, disc) = s
            .split_once('#')
            .ok_or_else(|| ProtocolError::InvalidIdentity("missing '#'".into()))?;
        validate_name(name)?;
        if disc.len() != DISCRIMINATOR_LEN || !disc.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProtocolError::InvalidIdentity(
                "discriminator must be exactly 4 digits".into(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Identity {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> String {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
