// escrow_app/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use escrow::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,

  /// Parent chat under which each accepted order gets its own expert thread.
  pub experts_chat_id: i64,

  pub transport_retry: RetryPolicy,

  /// `None` disables the expired-token sweeper.
  pub token_ttl: Option<chrono::Duration>,
  pub token_sweep_interval: Duration,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    let config = Self::from_lookup(|name| env::var(name).ok())?;
    tracing::info!("Application configuration loaded successfully.");
    Ok(config)
  }

  /// Builds the config from any key lookup. `from_env` passes the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let required = |name: &str| {
      lookup(name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", name)))
    };

    let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_or(&lookup, "SERVER_PORT", 8080u16)?;
    let database_url = required("DATABASE_URL")?;
    let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;
    let experts_chat_id = parse_value::<i64>("EXPERTS_CHAT_ID", &required("EXPERTS_CHAT_ID")?)?;

    let max_attempts = parse_or(&lookup, "TRANSPORT_MAX_ATTEMPTS", 5u32)?;
    if max_attempts == 0 {
      return Err(AppError::Config("TRANSPORT_MAX_ATTEMPTS must be at least 1".to_string()));
    }
    let transport_retry = RetryPolicy {
      max_attempts,
      base_delay: Duration::from_millis(parse_or(&lookup, "TRANSPORT_BASE_DELAY_MS", 500u64)?),
      max_delay: Duration::from_millis(parse_or(&lookup, "TRANSPORT_MAX_DELAY_MS", 30_000u64)?),
    };

    let ttl_hours = parse_or(&lookup, "TOKEN_TTL_HOURS", 168i64)?;
    if ttl_hours < 0 {
      return Err(AppError::Config("TOKEN_TTL_HOURS must not be negative".to_string()));
    }
    let token_ttl = (ttl_hours > 0).then(|| chrono::Duration::hours(ttl_hours));
    let sweep_secs = parse_or(&lookup, "TOKEN_SWEEP_INTERVAL_SECS", 3600u64)?;
    if sweep_secs == 0 {
      return Err(AppError::Config("TOKEN_SWEEP_INTERVAL_SECS must be at least 1".to_string()));
    }

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      experts_chat_id,
      transport_retry,
      token_ttl,
      token_sweep_interval: Duration::from_secs(sweep_secs),
    })
  }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(name) {
    Some(raw) => parse_value(name, &raw),
    None => Ok(default),
  }
}
