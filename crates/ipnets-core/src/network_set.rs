//! Shared Network Set
//!
//! Holds the current list of prefixes behind a copy-on-write pointer.
//! The single writer builds a fresh list and swaps it in; readers clone the
//! pointer and work on an immutable snapshot, so a reader never observes a
//! half-replaced set.

use crate::prefix::NetworkPrefix;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Point-in-time, immutable view of a `NetworkSet`
#[derive(Debug, Clone)]
pub struct Snapshot {
    prefixes: Arc<[NetworkPrefix]>,
}

impl Snapshot {
    /// Iterate prefixes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &NetworkPrefix> {
        self.prefixes.iter()
    }

    /// Check if any prefix in this snapshot contains `addr`
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.prefixes.iter().any(|prefix| prefix.contains(addr))
    }

    /// Canonical string form of every prefix
    pub fn to_strings(&self) -> Vec<String> {
        self.prefixes.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Serializes as a sequence of canonical CIDR strings
impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Concurrency-safe set of network prefixes
#[derive(Debug)]
pub struct NetworkSet {
    current: RwLock<Arc<[NetworkPrefix]>>,
}

impl NetworkSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Discard the current contents and install `prefixes`.
    ///
    /// Duplicates collapse on their canonical form. Readers see either the
    /// old or the new contents, never a mixture.
    pub fn replace<I>(&self, prefixes: I)
    where
        I: IntoIterator<Item = NetworkPrefix>,
    {
        let unique: BTreeSet<NetworkPrefix> = prefixes.into_iter().collect();
        let next: Arc<[NetworkPrefix]> = unique.into_iter().collect();
        let count = next.len();

        // The guarded value is a single pointer, so a poisoned lock still
        // holds a consistent set.
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = next;
        drop(current);

        debug!("Network set replaced: {} prefixes", count);
    }

    /// Take an immutable snapshot of the current contents
    pub fn snapshot(&self) -> Snapshot {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        Snapshot {
            prefixes: Arc::clone(&current),
        }
    }

    /// Check if `addr` falls inside any stored prefix
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.snapshot().contains(addr)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for NetworkSet {
    fn default() -> Self {
        Self::new()
    }
}
