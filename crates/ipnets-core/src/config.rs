//! Runtime Configuration
//!
//! Built-in defaults, overridable through environment variables:
//!
//! | variable          | default                             |
//! |-------------------|-------------------------------------|
//! | `UPDATE_INTERVAL` | `1h`                                |
//! | `UPDATE_IPV4_URL` | `https://www.cloudflare.com/ips-v4` |
//! | `LISTEN_ADDR`     | `localhost:8080`                    |
//! | `FETCH_TIMEOUT`   | `30s`                               |
//!
//! Durations use the `1h30m` / `1.5s` / `250ms` notation. An invalid
//! override is an error; the process is expected to refuse to start.

use crate::source::FetcherConfig;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_UPDATE_IPV4_URL: &str = "https://www.cloudflare.com/ips-v4";
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8080";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const VALID_TIME_UNITS: &str = "'ns', 'us' (or 'µs'), 'ms', 's', 'm', 'h'";

/// Errors from parsing a duration string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid number")]
    InvalidNumber,

    #[error("missing unit")]
    MissingUnit,

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("duration out of range")]
    Overflow,

    #[error("duration must be positive")]
    NotPositive,
}

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid duration ('{value}': {source}). Valid time units are: {}", VALID_TIME_UNITS)]
    InvalidDuration {
        key: &'static str,
        value: String,
        source: DurationError,
    },

    #[error("{key} is not a valid URL ('{value}': {reason})")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{key} is not a valid listen address ('{value}'), expected host:port")]
    InvalidListenAddr { key: &'static str, value: String },
}

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How often the network set is refreshed
    pub update_interval: Duration,
    /// Source URL of the newline-separated IPv4 CIDR list
    pub update_ipv4_url: String,
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Bound on a single source fetch
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            update_ipv4_url: DEFAULT_UPDATE_IPV4_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl Config {
    /// Load defaults, then apply overrides from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load defaults, then apply overrides from `lookup`.
    ///
    /// Unset and empty variables keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let mut config = Self::default();

        if let Some(value) = get("UPDATE_INTERVAL") {
            config.update_interval = positive_duration("UPDATE_INTERVAL", value)?;
        }

        if let Some(value) = get("UPDATE_IPV4_URL") {
            config.update_ipv4_url = source_url("UPDATE_IPV4_URL", value)?;
        }

        if let Some(value) = get("LISTEN_ADDR") {
            config.listen_addr = listen_addr("LISTEN_ADDR", value)?;
        }

        if let Some(value) = get("FETCH_TIMEOUT") {
            config.fetch_timeout = positive_duration("FETCH_TIMEOUT", value)?;
        }

        Ok(config)
    }

    /// Fetcher settings derived from this configuration
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: self.fetch_timeout,
            ..FetcherConfig::default()
        }
    }
}

fn positive_duration(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    let parsed = match parse_duration(&value) {
        Ok(d) if d.is_zero() => Err(DurationError::NotPositive),
        other => other,
    };
    parsed.map_err(|source| ConfigError::InvalidDuration { key, value, source })
}

fn source_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key,
        value: value.clone(),
        reason,
    };

    let url = Url::parse(&value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url.to_string())
}

fn listen_addr(key: &'static str, value: String) -> Result<String, ConfigError> {
    let valid = value
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());

    if valid {
        Ok(value)
    } else {
        Err(ConfigError::InvalidListenAddr { key, value })
    }
}

/// Parse a duration such as `1h`, `1h30m`, `1.5s` or `250ms`.
///
/// Accepts one or more `<number><unit>` terms with units `ns`, `us`, `µs`,
/// `ms`, `s`, `m` and `h`, an optional leading `+`, and the bare string `0`.
/// Negative durations and anything above `2562047h47m16.854775807s` are
/// rejected.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.starts_with('-') {
        return Err(DurationError::NotPositive);
    }
    if rest.is_empty() {
        return Err(DurationError::Empty);
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_digits, after_int) = rest.split_at(int_end);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_end = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_end)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(DurationError::InvalidNumber);
        }

        let unit_end = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_end);
        let per_unit = unit_nanos(unit)?;

        let int_value: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| DurationError::Overflow)?
        };
        total = int_value
            .checked_mul(per_unit)
            .and_then(|v| total.checked_add(v))
            .ok_or(DurationError::Overflow)?;

        // Digits past nanosecond precision of an hour cannot change the result.
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        if !frac_digits.is_empty() {
            let frac_value: u128 = frac_digits.parse().map_err(|_| DurationError::InvalidNumber)?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            total = total
                .checked_add(frac_value * per_unit / scale)
                .ok_or(DurationError::Overflow)?;
        }

        rest = after_unit;
    }

    // Same upper bound as a signed 64-bit nanosecond count (~2562047h)
    let nanos = i64::try_from(total).map_err(|_| DurationError::Overflow)?;
    Ok(Duration::from_nanos(nanos.unsigned_abs()))
}

fn unit_nanos(unit: &str) -> Result<u128, DurationError> {
    match unit {
        "" => Err(DurationError::MissingUnit),
        "ns" => Ok(1),
        "us" | "µs" | "μs" => Ok(1_000),
        "ms" => Ok(1_000_000),
        "s" => Ok(1_000_000_000),
        "m" => Ok(60 * 1_000_000_000),
        "h" => Ok(60 * 60 * 1_000_000_000),
        other => Err(DurationError::UnknownUnit(other.to_string())),
    }
}
