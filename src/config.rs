use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for a single page fetch, connect through body.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        mongo_uri: get_env("MONGO_URI"),
        mongo_db_name: get_env_or_default("MONGO_DB_NAME", "trawl"),
        fetch_timeout: Duration::from_secs(get_env_parsed(
            "FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
        )),
        user_agent: get_env_or_default(
            "CRAWL_USER_AGENT",
            concat!("trawl/", env!("CARGO_PKG_VERSION")),
        ),
        crawl_concurrency: get_env_parsed("CRAWL_CONCURRENCY", 1),
        per_host_limit: get_env_parsed("CRAWL_PER_HOST", 1),
        bind_addr: get_env_or_default("BIND_ADDR", "127.0.0.1:4000"),
    }
});

pub struct Config {
    pub mongo_uri: String,
    pub mongo_db_name: String,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub crawl_concurrency: usize,
    pub per_host_limit: usize,
    pub bind_addr: String,
}

fn get_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("Missing required environment variable: {key}"))
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring malformed {key}={raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}
