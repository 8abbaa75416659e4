use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_DB_PATH: &str = "data/crashes.sqlite";
const DEFAULT_BASE_URL: &str = "https://accidentreports.iowa.gov/";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read once from the environment and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub base_url: String,
    pub results_url: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = get("CRASH_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let results_url =
            get("CRASH_RESULTS_URL").unwrap_or_else(|| format!("{}?dist=scraper", base_url));

        Ok(Config {
            db_path: get("CRASH_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            base_url,
            results_url,
            concurrency: parse_var(&get, "CRASH_CONCURRENCY", DEFAULT_CONCURRENCY)?.max(1),
            max_retries: parse_var(&get, "CRASH_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            timeout: Duration::from_secs(parse_var(&get, "CRASH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
        })
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}
