use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::limits::{MAX_PRICE_CENTS, MAX_TAX_RATE_BPS};
use crate::pricing::PricingPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Server settings, read from `INNLEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    /// Zero disables pending-booking expiry.
    pub pending_ttl: Duration,
    pub pricing: PricingPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = PricingPolicy::default();
        Ok(Self {
            bind: try_load(&lookup, "INNLEDGER_BIND", "0.0.0.0")?,
            port: try_load(&lookup, "INNLEDGER_PORT", "8080")?,
            data_dir: try_load(&lookup, "INNLEDGER_DATA_DIR", "./data")?,
            metrics_port: try_load_optional(&lookup, "INNLEDGER_METRICS_PORT")?,
            max_connections: positive(
                try_load(&lookup, "INNLEDGER_MAX_CONNECTIONS", "256")?,
                "INNLEDGER_MAX_CONNECTIONS",
            )?,
            compact_threshold: positive(
                try_load(&lookup, "INNLEDGER_COMPACT_THRESHOLD", "1000")?,
                "INNLEDGER_COMPACT_THRESHOLD",
            )?,
            pending_ttl: Duration::from_secs(try_load(&lookup, "INNLEDGER_PENDING_TTL_SECS", "1800")?),
            pricing: PricingPolicy {
                tax_rate_bps: at_most(
                    try_load(
                        &lookup,
                        "INNLEDGER_TAX_RATE_BPS",
                        &defaults.tax_rate_bps.to_string(),
                    )?,
                    MAX_TAX_RATE_BPS,
                    "INNLEDGER_TAX_RATE_BPS",
                )?,
                service_fee: at_most(
                    non_negative(
                        try_load(
                            &lookup,
                            "INNLEDGER_SERVICE_FEE_CENTS",
                            &defaults.service_fee.to_string(),
                        )?,
                        "INNLEDGER_SERVICE_FEE_CENTS",
                    )?,
                    MAX_PRICE_CENTS,
                    "INNLEDGER_SERVICE_FEE_CENTS",
                )?,
            },
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        debug!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse(key, raw)
}

fn try_load_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse(key, raw).map(Some),
        _ => Ok(None),
    }
}

fn parse<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn positive<T: PartialOrd + Default + Display>(value: T, key: &'static str) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        })
    }
}

fn non_negative(value: i64, key: &'static str) -> Result<i64, ConfigError> {
    if value >= 0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must not be negative".into(),
        })
    }
}

fn at_most<T: PartialOrd + Display>(value: T, max: T, key: &'static str) -> Result<T, ConfigError> {
    if value <= max {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must be at most {max}"),
        })
    }
}
