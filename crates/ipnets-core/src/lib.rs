//! ipnets Core
//!
//! A periodically refreshed set of IPv4 networks with membership queries.
//!
//! Architecture:
//! 1. Refresher fetches a newline-separated CIDR list from a source URL
//! 2. Parsed blocks are swapped into the NetworkSet in one step
//! 3. QueryService reads consistent snapshots for listing and address checks

mod config;
mod network_set;
mod prefix;
mod query;
mod refresher;
mod source;

pub use config::{
    parse_duration, Config, ConfigError, DurationError, DEFAULT_FETCH_TIMEOUT, DEFAULT_LISTEN_ADDR,
    DEFAULT_UPDATE_INTERVAL, DEFAULT_UPDATE_IPV4_URL,
};
pub use network_set::{NetworkSet, Snapshot};
pub use prefix::{NetworkPrefix, PrefixParseError};
pub use query::{AddressCheck, QueryError, QueryService};
pub use refresher::{parse_prefixes, RefreshReport, Refresher, RejectedLine};
pub use source::{Fetch, FetchError, FetcherConfig, HttpFetcher};
