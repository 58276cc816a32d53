//! Network Set Refresher
//!
//! Fetches the CIDR list from the source URL, parses it line by line and
//! swaps the result into the shared `NetworkSet`.
//!
//! Failure handling:
//! - Unparsable line: warned and skipped, the rest of the batch still lands
//! - Failed fetch: the refresh is aborted and the current set stays in place
//!
//! Scheduling is a fixed-period tokio interval. A run that takes longer than
//! the period delays the next tick instead of overlapping it.

use crate::network_set::NetworkSet;
use crate::prefix::{NetworkPrefix, PrefixParseError};
use crate::source::{Fetch, FetchError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// A source line that could not be parsed as a CIDR block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the source body
    pub line_no: usize,
    pub text: String,
    pub error: PrefixParseError,
}

/// Outcome of a successful refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Unique prefixes now installed
    pub installed: usize,
    /// Lines skipped as unparsable
    pub rejected: usize,
}

/// Parse a newline-separated CIDR list.
///
/// Blank lines and `#` comments are skipped silently. Every other line that
/// is not a valid IPv4 CIDR block is returned as rejected.
pub fn parse_prefixes(body: &str) -> (BTreeSet<NetworkPrefix>, Vec<RejectedLine>) {
    let mut prefixes = BTreeSet::new();
    let mut rejected = Vec::new();

    for (idx, line) in body.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match trimmed.parse::<NetworkPrefix>() {
            Ok(prefix) => {
                prefixes.insert(prefix);
            }
            Err(error) => rejected.push(RejectedLine {
                line_no: idx + 1,
                text: trimmed.to_string(),
                error,
            }),
        }
    }

    (prefixes, rejected)
}

/// Periodically reloads a `NetworkSet` from a source URL
pub struct Refresher<F> {
    set: Arc<NetworkSet>,
    fetcher: F,
    source_url: String,
}

impl<F> Refresher<F>
where
    F: Fetch + 'static,
{
    pub fn new(set: Arc<NetworkSet>, fetcher: F, source_url: impl Into<String>) -> Self {
        Self {
            set,
            fetcher,
            source_url: source_url.into(),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Fetch, parse and install the source list once.
    ///
    /// The set is replaced only when the fetch succeeds, even if every line
    /// was rejected. On a fetch error the current set is left untouched.
    pub async fn refresh(&self) -> Result<RefreshReport, FetchError> {
        let body = match self.fetcher.fetch(&self.source_url).await {
            Ok(body) => body,
            Err(e) => {
                error!("Unable to get IP networks from {}: {}", self.source_url, e);
                return Err(e);
            }
        };

        let (prefixes, rejected) = parse_prefixes(&body);
        for line in &rejected {
            warn!("Failed to parse CIDR on line {}: {}", line.line_no, line.error);
        }

        let report = RefreshReport {
            installed: prefixes.len(),
            rejected: rejected.len(),
        };
        self.set.replace(prefixes);

        info!(
            "Network set refreshed from {}: {} prefixes installed, {} lines rejected",
            self.source_url, report.installed, report.rejected
        );

        Ok(report)
    }

    /// Refresh every `period`, forever.
    ///
    /// The first tick fires one period after the call.
    pub async fn run(self, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Errors are already logged; the next tick is the retry.
            let _ = self.refresh().await;
        }
    }

    /// Refresh once, then keep refreshing in a background task
    pub async fn start(self, period: Duration) -> JoinHandle<()> {
        let _ = self.refresh().await;
        tokio::spawn(self.run(period))
    }
}
