//! Service configuration, read once from the environment at startup.

use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

pub const LISTEN_ADDR_ENV: &str = "ZKCOOKIE_LISTEN_ADDR";
pub const SESSION_SECRET_ENV: &str = "ZKCOOKIE_SESSION_SECRET";
pub const ALLOW_DEV_SECRET_ENV: &str = "ZKCOOKIE_ALLOW_DEV_SECRET";
pub const VK_PATH_ENV: &str = "ZKCOOKIE_VK_PATH";
pub const NULLIFIER_DB_ENV: &str = "ZKCOOKIE_NULLIFIER_DB";
pub const CHALLENGE_DB_ENV: &str = "ZKCOOKIE_CHALLENGE_DB";
pub const NONCE_TTL_ENV: &str = "ZKCOOKIE_NONCE_TTL_MS";
pub const SESSION_TTL_ENV: &str = "ZKCOOKIE_SESSION_TTL_MS";
pub const COOKIE_SECURE_ENV: &str = "ZKCOOKIE_COOKIE_SECURE";
pub const SWEEP_INTERVAL_ENV: &str = "ZKCOOKIE_SWEEP_INTERVAL_SECS";
pub const ENABLE_CORS_ENV: &str = "ZKCOOKIE_ENABLE_CORS";
pub const LOG_JSON_ENV: &str = "ZKCOOKIE_LOG_JSON";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_VK_PATH: &str = "build/cookie_verification_key.json";
const DEFAULT_NULLIFIER_DB_PATH: &str = "data/nullifiers.db";
const IN_MEMORY: &str = "memory";
pub const DEFAULT_NONCE_TTL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_SESSION_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEV_SESSION_SECRET: &str = "zkcookie-insecure-development-secret";
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("ZKCOOKIE_SESSION_SECRET must be at least 16 bytes")]
    WeakSecret,
}

/// Where a store keeps its records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    Sled(PathBuf),
}

impl StoreLocation {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case(IN_MEMORY) {
            StoreLocation::InMemory
        } else {
            StoreLocation::Sled(PathBuf::from(value.trim()))
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub session_secret: String,
    /// Set when the built-in development secret is in use.
    pub dev_secret: bool,
    pub vk_path: PathBuf,
    pub nullifier_store: StoreLocation,
    pub challenge_store: StoreLocation,
    pub nonce_ttl_ms: u64,
    pub session_ttl_ms: u64,
    pub cookie_secure: bool,
    pub sweep_interval: Duration,
    pub enable_cors: bool,
    pub log_json: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allow_dev_secret = parse_bool(&lookup, ALLOW_DEV_SECRET_ENV, false)?;
        let (session_secret, dev_secret) = match lookup(SESSION_SECRET_ENV) {
            Some(secret) if !secret.is_empty() => {
                if secret.len() < MIN_SECRET_LEN {
                    return Err(ConfigError::WeakSecret);
                }
                (secret, false)
            }
            _ if allow_dev_secret => (DEV_SESSION_SECRET.to_string(), true),
            _ => return Err(ConfigError::Missing(SESSION_SECRET_ENV)),
        };

        let nonce_ttl_ms = parse_positive_u64(&lookup, NONCE_TTL_ENV, DEFAULT_NONCE_TTL_MS)?;
        let session_ttl_ms = parse_positive_u64(&lookup, SESSION_TTL_ENV, DEFAULT_SESSION_TTL_MS)?;
        let sweep_secs =
            parse_positive_u64(&lookup, SWEEP_INTERVAL_ENV, DEFAULT_SWEEP_INTERVAL_SECS)?;

        Ok(Self {
            listen_addr: lookup(LISTEN_ADDR_ENV).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into()),
            session_secret,
            dev_secret,
            vk_path: lookup(VK_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VK_PATH)),
            nullifier_store: StoreLocation::parse(
                &lookup(NULLIFIER_DB_ENV).unwrap_or_else(|| DEFAULT_NULLIFIER_DB_PATH.into()),
            ),
            challenge_store: StoreLocation::parse(
                &lookup(CHALLENGE_DB_ENV).unwrap_or_else(|| IN_MEMORY.into()),
            ),
            nonce_ttl_ms,
            session_ttl_ms,
            cookie_secure: parse_bool(&lookup, COOKIE_SECURE_ENV, false)?,
            sweep_interval: Duration::from_secs(sweep_secs),
            enable_cors: parse_bool(&lookup, ENABLE_CORS_ENV, true)?,
            log_json: parse_bool(&lookup, LOG_JSON_ENV, false)?,
        })
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        "" => Ok(default),
        _ => Err(ConfigError::InvalidValue { var, value }),
    }
}

fn parse_positive_u64<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { var, value }),
    }
}
