//! Network prefixes (CIDR blocks)
//!
//! A `NetworkPrefix` is always stored in canonical form: host bits are
//! zeroed on construction, so `10.1.2.5/24` and `10.1.2.0/24` are the same
//! prefix.

use ipnet::Ipv4Net;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a CIDR block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixParseError {
    #[error("empty CIDR block")]
    Empty,

    #[error("missing prefix length in '{0}'")]
    MissingLength(String),

    #[error("IPv6 CIDR blocks are not supported: '{0}'")]
    Ipv6(String),

    #[error("invalid CIDR block '{0}'")]
    Invalid(String),
}

/// An IPv4 CIDR block in canonical form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkPrefix(Ipv4Net);

impl NetworkPrefix {
    /// Build a prefix from an address and a length, zeroing host bits.
    ///
    /// Returns `None` when `len` is greater than 32.
    pub fn new(addr: Ipv4Addr, len: u8) -> Option<Self> {
        Ipv4Net::new(addr, len).ok().map(Self::from)
    }

    /// Network address (host bits zero)
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Broadcast address (host bits one)
    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Check whether an address lies inside this block.
    ///
    /// The address is masked with the prefix length and compared with the
    /// network address. IPv6 addresses never match.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.contains_v4(v4),
            IpAddr::V6(_) => false,
        }
    }

    fn contains_v4(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.0.netmask());
        u32::from(addr) & mask == u32::from(self.0.network())
    }
}

impl From<Ipv4Net> for NetworkPrefix {
    fn from(net: Ipv4Net) -> Self {
        Self(net.trunc())
    }
}

impl FromStr for NetworkPrefix {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PrefixParseError::Empty);
        }
        if s.contains(':') {
            return Err(PrefixParseError::Ipv6(s.to_string()));
        }
        if !s.contains('/') {
            return Err(PrefixParseError::MissingLength(s.to_string()));
        }

        s.parse::<Ipv4Net>()
            .map(Self::from)
            .map_err(|_| PrefixParseError::Invalid(s.to_string()))
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.network(), self.0.prefix_len())
    }
}

impl Serialize for NetworkPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
