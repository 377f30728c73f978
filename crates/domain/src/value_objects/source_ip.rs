//! Source IP value object
//!
//! Source IPs are IPv4 dotted quads; kept as a strongly typed `Ipv4Addr`
//! rather than a bare string so the /24 projection used by subnet grouping
//! cannot drift from a single implementation.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A source IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceIp(Ipv4Addr);

impl SourceIp {
    /// Wrap an already-parsed `Ipv4Addr`.
    #[must_use]
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Parse a dotted-quad string into a `SourceIp`.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        Ipv4Addr::from_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidSourceIp(format!("{s}: {e}")))
    }

    /// The underlying address.
    #[must_use]
    pub const fn as_ipv4(&self) -> Ipv4Addr {
        self.0
    }

    /// Project this address onto its /24 network, represented as the
    /// first three octets joined by dots.
    #[must_use]
    pub fn subnet24(&self) -> Subnet24 {
        let [a, b, c, _] = self.0.octets();
        Subnet24([a, b, c])
    }
}

impl fmt::Display for SourceIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceIp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A /24 IPv4 network, identified by its first three octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subnet24([u8; 3]);

impl fmt::Display for Subnet24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}
