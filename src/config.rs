//! # Configuration Module
//!
//! Runtime configuration read from the environment (after `.env` is loaded).

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_COMPANY_PHONE: &str = "+7(978)-959-70-77";
pub const DEFAULT_BOT_USERNAME: &str = "order_intake_bot";
pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 60;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Session expiry settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are cleared
    pub ttl: Duration,
    /// How often the reaper runs
    pub reap_interval: Duration,
}

impl SessionConfig {
    /// Build from raw settings, rejecting values the reaper cannot run with
    pub fn from_settings(ttl_minutes: u64, reap_interval_secs: u64) -> Result<Self> {
        if ttl_minutes == 0 {
            bail!("SESSION_TTL_MINUTES must be greater than zero");
        }
        if reap_interval_secs == 0 {
            bail!("SESSION_REAP_INTERVAL_SECS must be greater than zero");
        }
        let ttl_secs = ttl_minutes
            .checked_mul(60)
            .with_context(|| format!("SESSION_TTL_MINUTES is too large: {ttl_minutes}"))?;

        Ok(Self {
            ttl: Duration::from_secs(ttl_secs),
            reap_interval: Duration::from_secs(reap_interval_secs),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_MINUTES * 60),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
        }
    }
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Phone number shown to clients who prefer to call themselves
    pub company_phone: String,
    /// Bot username used to build referral deep links
    pub bot_username: String,
    /// Language used when the user's Telegram language is not supported
    pub default_language: String,
    pub session: SessionConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            database_url: String::new(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            company_phone: DEFAULT_COMPANY_PHONE.to_string(),
            bot_username: DEFAULT_BOT_USERNAME.to_string(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load the configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let telegram_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let ttl_minutes = parse_var("SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES)?;
        let reap_secs = parse_var("SESSION_REAP_INTERVAL_SECS", DEFAULT_REAP_INTERVAL_SECS)?;

        Ok(Self {
            telegram_token,
            database_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            company_phone: env::var("COMPANY_PHONE").unwrap_or(defaults.company_phone),
            bot_username: env::var("BOT_USERNAME").unwrap_or(defaults.bot_username),
            default_language: env::var("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            session: SessionConfig::from_settings(ttl_minutes, reap_secs)?,
        })
    }

    /// Referral deep link for the given inviter
    pub fn referral_link(&self, inviter: i64) -> String {
        format!("https://t.me/{}?start=ref_{}", self.bot_username, inviter)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
