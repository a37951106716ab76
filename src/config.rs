//! Runtime configuration loaded once at startup from the environment.

use anyhow::{bail, Result};
use std::env;
use std::time::Duration;

fn env_flag(key: &str) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => false,
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub clob_host: String,
    pub chain_id: u64,

    pub dome_api_key: Option<String>,
    pub dome_base_url: String,

    pub builder_api_key: Option<String>,
    pub builder_api_secret: Option<String>,
    pub builder_api_passphrase: Option<String>,
    pub builder_signing_url: Option<String>,

    pub session_cookie_name: String,
    pub session_ttl_seconds: u64,
    pub nonce_ttl_seconds: u64,

    pub auth_rate_limit_max_requests: u32,
    pub auth_rate_limit_window_seconds: u64,

    pub tp_poll_seconds: u64,
    pub tp_max_minutes: u64,

    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        if !env_flag("WEB_EXPERIMENT") {
            bail!("WEB_EXPERIMENT is disabled. Set WEB_EXPERIMENT=1 to run this gateway.");
        }

        Ok(Self {
            clob_host: env_string_or("CLOB_HOST", "https://clob.polymarket.com"),
            chain_id: env_or("CHAIN_ID", 137),

            dome_api_key: env::var("DOME_API_KEY").ok().filter(|v| !v.is_empty()),
            dome_base_url: env_string_or("DOME_BASE_URL", "https://api.domeapi.io/v1"),

            builder_api_key: env::var("BUILDER_API_KEY").ok().filter(|v| !v.is_empty()),
            builder_api_secret: env::var("BUILDER_API_SECRET").ok().filter(|v| !v.is_empty()),
            builder_api_passphrase: env::var("BUILDER_API_PASSPHRASE").ok().filter(|v| !v.is_empty()),
            builder_signing_url: env::var("BUILDER_SIGNING_URL").ok().filter(|v| !v.is_empty()),

            session_cookie_name: env_string_or("SESSION_COOKIE_NAME", "session"),
            session_ttl_seconds: env_or("SESSION_TTL_SECONDS", 86_400),
            nonce_ttl_seconds: env_or("NONCE_TTL_SECONDS", 300),

            auth_rate_limit_max_requests: env_or("AUTH_RATE_LIMIT_MAX_REQUESTS", 10),
            auth_rate_limit_window_seconds: env_or("AUTH_RATE_LIMIT_WINDOW_SECONDS", 60),

            tp_poll_seconds: env_or("TP_POLL_SECONDS", 4),
            tp_max_minutes: env_or("TP_MAX_MINUTES", 60),

            bind_addr: env_string_or("BIND_ADDR", "0.0.0.0:3000"),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// CLOB-auth EIP-712 domain constants (shared by nonce signing and server-side verification).
pub const CLOB_AUTH_DOMAIN_NAME: &str = "ClobAuthDomain";
pub const CLOB_AUTH_DOMAIN_VERSION: &str = "1";
pub const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

/// Regular and neg-risk CTF Exchange verifying contracts, keyed by chain id.
/// Mirrors the upstream `get_contract_config(chain_id, neg_risk).exchange` lookup table.
pub fn contract_config(chain_id: u64, neg_risk: bool) -> &'static str {
    match (chain_id, neg_risk) {
        (137, false) => "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E",
        (137, true) => "0xC5d563A36AE78145C45a50134d48A1215220f80a",
        (80002, false) => "0xdFE02Eb6733538f8Ea35D585af8DE5958AD99E40",
        (80002, true) => "0x71523d0f655B41E805Cec45b17163f528B59B820",
        _ => "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E",
    }
}

pub const DEFAULT_EXCHANGE_ADDRESS: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
