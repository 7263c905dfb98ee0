//! Process configuration, read from the environment (and `.env` via dotenvy).

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::db::ACQUIRE_TIMEOUT;
use crate::escrow::EscrowRetryPolicy;
use crate::gate::FundingPolicy;
use crate::service::ServiceSettings;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./fundgate.sqlite?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub escrow_url: Url,
    pub escrow_timeout: Duration,
    pub escrow_max_attempts: u32,
    pub escrow_deadline: Duration,
    pub policy: FundingPolicy,
    /// Requests per minute per client IP; `None` disables rate limiting.
    pub rate_limit_per_minute: Option<NonZeroU32>,
    pub stale_write_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url =
            get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 127.0.0.1:3000")?;

        let escrow_url = get("ESCROW_URL").ok_or_else(|| anyhow!("ESCROW_URL must be set"))?;
        let escrow_url = Url::parse(&escrow_url)
            .with_context(|| format!("ESCROW_URL is not a valid URL: {}", escrow_url))?;

        let escrow_timeout =
            Duration::from_secs(parse_or(&get, "ESCROW_TIMEOUT_SECS", 10u64)?);
        let escrow_max_attempts = parse_or(&get, "ESCROW_MAX_ATTEMPTS", 3u32)?;
        if escrow_max_attempts == 0 {
            return Err(anyhow!("ESCROW_MAX_ATTEMPTS must be at least 1"));
        }
        let escrow_deadline =
            Duration::from_secs(parse_or(&get, "ESCROW_DEADLINE_SECS", 20u64)?);
        if escrow_deadline.is_zero() || escrow_deadline >= ACQUIRE_TIMEOUT {
            return Err(anyhow!(
                "ESCROW_DEADLINE_SECS must be between 1 and {}",
                ACQUIRE_TIMEOUT.as_secs() - 1
            ));
        }

        let first_milestone_threshold_pct =
            parse_or(&get, "FIRST_MILESTONE_THRESHOLD_PCT", 50u8)?;
        let later_milestone_threshold_pct =
            parse_opt::<u8>(&get, "LATER_MILESTONE_THRESHOLD_PCT")?;
        for (key, pct) in [
            ("FIRST_MILESTONE_THRESHOLD_PCT", Some(first_milestone_threshold_pct)),
            ("LATER_MILESTONE_THRESHOLD_PCT", later_milestone_threshold_pct),
        ] {
            if matches!(pct, Some(p) if p > 100) {
                return Err(anyhow!("{} must be between 0 and 100", key));
            }
        }

        let rate_limit_per_minute = parse_opt::<NonZeroU32>(&get, "RATE_LIMIT_PER_MINUTE")?;
        let stale_write_retries = parse_or(&get, "STALE_WRITE_RETRIES", 3u32)?;

        Ok(Self {
            database_url,
            bind_addr,
            escrow_url,
            escrow_timeout,
            escrow_max_attempts,
            escrow_deadline,
            policy: FundingPolicy {
                first_milestone_threshold_pct,
                later_milestone_threshold_pct,
            },
            rate_limit_per_minute,
            stale_write_retries,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            policy: self.policy,
            escrow_retry: EscrowRetryPolicy {
                attempt_timeout: self.escrow_timeout,
                max_attempts: self.escrow_max_attempts,
                deadline: self.escrow_deadline,
                ..EscrowRetryPolicy::default()
            },
            stale_write_attempts: self.stale_write_retries.max(1),
        }
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{} has an invalid value: {}", key, raw))
        })
        .transpose()
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}
