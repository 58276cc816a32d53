//! Read-only queries against the network set

use crate::network_set::{NetworkSet, Snapshot};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid IP address: '{0}'")]
    InvalidAddress(String),
}

/// Result of checking one address against the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCheck {
    /// Whether any stored prefix contains the address
    pub matched: bool,
    /// The parsed address, IPv4-mapped IPv6 folded to IPv4
    pub address: IpAddr,
}

impl AddressCheck {
    /// Canonical string form of the checked address
    pub fn normalized(&self) -> String {
        self.address.to_string()
    }
}

/// Listing and membership queries over a shared `NetworkSet`
#[derive(Debug, Clone)]
pub struct QueryService {
    set: Arc<NetworkSet>,
}

impl QueryService {
    pub fn new(set: Arc<NetworkSet>) -> Self {
        Self { set }
    }

    /// Canonical strings of every prefix currently installed
    pub fn list_networks(&self) -> Vec<String> {
        self.set.snapshot().to_strings()
    }

    /// Point-in-time view of the installed prefixes
    pub fn snapshot(&self) -> Snapshot {
        self.set.snapshot()
    }

    /// Number of prefixes currently installed
    pub fn network_count(&self) -> usize {
        self.set.len()
    }

    /// Parse `raw` as an IP address and test it against the set.
    ///
    /// An unparsable or empty input is an error, never a "no match".
    pub fn check_address(&self, raw: &str) -> Result<AddressCheck, QueryError> {
        let address = raw
            .parse::<IpAddr>()
            .map_err(|_| QueryError::InvalidAddress(raw.to_string()))?
            .to_canonical();

        Ok(AddressCheck {
            matched: self.set.contains(address),
            address,
        })
    }
}
