//! Server configuration, read from the environment (and `.env` when present).
//!
//! - `DATABASE_URL` (required)
//! - `TOKEN_SECRET` (required, at least 32 bytes)
//! - `BIND_ADDR` (default `127.0.0.1:3000`)
//! - `TOKEN_TTL_HOURS` (default 24, at most one year)
//! - `DATABASE_MAX_CONNECTIONS` (default 5)

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

use crate::token::DEFAULT_TTL_HOURS;

pub const MIN_SECRET_LENGTH: usize = 32;
pub const MAX_TTL_HOURS: i64 = 24 * 365;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string (contains the password)
    pub database_url: SecretString,
    /// HMAC key for session tokens
    pub token_secret: SecretString,
    pub bind_addr: SocketAddr,
    pub token_ttl_hours: i64,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env file is normal in production
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let token_secret = required("TOKEN_SECRET")?;
        if token_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid(
                "TOKEN_SECRET",
                format!("must be at least {} bytes", MIN_SECRET_LENGTH),
            ));
        }

        let bind_addr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>().ok())?;
        let token_ttl_hours = parse_or(&lookup, "TOKEN_TTL_HOURS", Some(DEFAULT_TTL_HOURS))?;
        if !(1..=MAX_TTL_HOURS).contains(&token_ttl_hours) {
            return Err(ConfigError::Invalid(
                "TOKEN_TTL_HOURS",
                format!("must be between 1 and {}", MAX_TTL_HOURS),
            ));
        }
        let max_connections =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(DEFAULT_MAX_CONNECTIONS))?;

        Ok(Config {
            database_url: SecretString::from(database_url),
            token_secret: SecretString::from(token_secret),
            bind_addr,
            token_ttl_hours,
            max_connections,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::Invalid(key, err.to_string())),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}
